//! Ask command implementation

use crate::answer::{Answer, AnswerChain, ChatTurn};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Serializable view of an answer for `--json` output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerView {
    pub text: String,
    pub citations: Vec<String>,
    pub retrieved: usize,
}

impl From<Answer> for AnswerView {
    fn from(a: Answer) -> Self {
        Self {
            text: a.text,
            citations: a.citations,
            retrieved: a.retrieved,
        }
    }
}

/// Answer one question against the index
pub async fn cmd_ask(
    chain: &AnswerChain,
    history: &[ChatTurn],
    question: &str,
) -> Result<AnswerView> {
    info!("Answering: {}", question);
    let answer = chain.answer(history, question).await?;
    Ok(answer.into())
}

/// Print an answer to console
pub fn print_answer(answer: &AnswerView) {
    println!("\n{}", answer.text);
    if answer.retrieved == 0 {
        println!("\n(no grounding retrieved from the index)");
    } else {
        println!(
            "\n({} chunks retrieved, {} sources cited)",
            answer.retrieved,
            answer.citations.len()
        );
    }
}
