//! Answer and reformulation generation
//!
//! Generation is an injected capability behind the [`Generator`] trait. Two
//! prompt slots exist: [`PromptTemplate::ContextQuery`] rewrites a follow-up
//! question into a standalone query, [`PromptTemplate::ResponseTemplate`]
//! produces the structured, cited answer.

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Opening delimiter prefix for one context chunk
pub const SOURCE_OPEN_PREFIX: &str = "<<<SOURCE: ";
/// Opening delimiter suffix
pub const SOURCE_OPEN_SUFFIX: &str = ">>>";
/// Closing delimiter for one context chunk
pub const SOURCE_CLOSE: &str = "<<<END SOURCE>>>";

const CONTEXT_QUERY_TEMPLATE: &str = "\
Given the conversation history and the latest question, rewrite the question \
so it can be understood without the history. Resolve pronouns and references \
to earlier turns. Do NOT answer the question; return only the rewritten \
question, nothing else.

Conversation history:
{history}

Latest question: {question}";

const RESPONSE_TEMPLATE: &str = "\
You are a clean-energy domain assistant. Answer the question using ONLY the \
context below. Each context passage is wrapped in <<<SOURCE: name>>> and \
<<<END SOURCE>>> markers; the name identifies where the passage came from.

Structure your answer as:
1. a short title
2. a one-paragraph summary
3. detailed points, each citing its supporting source name in square \
brackets, e.g. [{example_source}]
4. a brief conclusion
5. a References section listing each cited source once

Never include the SOURCE markers in your answer. If the context does not \
contain enough information, say so explicitly instead of guessing.

Context:
{context}

Question: {question}";

/// The two prompt slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// Rewrite a history-dependent question into a standalone query
    ContextQuery,
    /// Generate the structured, cited answer
    ResponseTemplate,
}

impl PromptTemplate {
    pub fn text(&self) -> &'static str {
        match self {
            PromptTemplate::ContextQuery => CONTEXT_QUERY_TEMPLATE,
            PromptTemplate::ResponseTemplate => RESPONSE_TEMPLATE,
        }
    }

    /// Substitute `{name}` placeholders
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut prompt = self.text().to_string();
        for (name, value) in vars {
            prompt = prompt.replace(&format!("{{{}}}", name), value);
        }
        prompt
    }
}

/// Trait for generation providers
#[async_trait]
pub trait Generator: Send + Sync {
    /// Render the template with `vars` and generate a completion
    async fn generate(&self, template: PromptTemplate, vars: &[(&str, &str)]) -> Result<String>;
}

/// HTTP chat-completions backend
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    timeout_secs: u64,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl HttpGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::new();
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.backend_url.trim_end_matches('/')),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            temperature: config.temperature,
        })
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let request = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": self.temperature,
            }))
            .send();

        let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), request)
            .await
            .map_err(|_| Error::GenerationTimeout(self.timeout_secs))??;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "Generation backend returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Generation("backend returned no choices".to_string()))?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, template: PromptTemplate, vars: &[(&str, &str)]) -> Result<String> {
        let prompt = template.render(vars);
        debug!(template = ?template, "Sending generation request");
        self.complete(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate as MockResponse};

    fn config(url: &str, timeout_secs: u64) -> LlmConfig {
        LlmConfig {
            backend_url: url.to_string(),
            model: "test-model".to_string(),
            timeout_secs,
            temperature: 0.0,
        }
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let prompt = PromptTemplate::ContextQuery.render(&[
            ("history", "user: what is green hydrogen?"),
            ("question", "what are its applications?"),
        ]);
        assert!(prompt.contains("user: what is green hydrogen?"));
        assert!(prompt.contains("Latest question: what are its applications?"));
        assert!(!prompt.contains("{history}"));
        assert!(!prompt.contains("{question}"));
    }

    #[test]
    fn test_response_template_mentions_delimiters() {
        let prompt = PromptTemplate::ResponseTemplate.render(&[
            ("context", "ctx"),
            ("question", "q"),
            ("example_source", "example.org"),
        ]);
        assert!(prompt.contains("<<<SOURCE: name>>>"));
        assert!(prompt.contains("[example.org]"));
    }

    #[tokio::test]
    async fn test_generate_returns_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(MockResponse::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "  standalone query  "}}]
            })))
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(&config(&server.uri(), 30)).unwrap();
        let output = generator
            .generate(
                PromptTemplate::ContextQuery,
                &[("history", "h"), ("question", "q")],
            )
            .await
            .unwrap();
        assert_eq!(output, "standalone query");
    }

    #[tokio::test]
    async fn test_generate_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                MockResponse::new(200)
                    .set_body_json(serde_json::json!({"choices": []}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(&config(&server.uri(), 1)).unwrap();
        let err = generator
            .generate(PromptTemplate::ContextQuery, &[("history", ""), ("question", "q")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GenerationTimeout(1)));
    }

    #[tokio::test]
    async fn test_generate_surfaces_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(MockResponse::new(503))
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(&config(&server.uri(), 30)).unwrap();
        let err = generator
            .generate(PromptTemplate::ContextQuery, &[("history", ""), ("question", "q")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }
}
