//! `docqa ask` and `docqa chat`: question answering from the terminal.
//!
//! Query failures are answered with a conversational message instead of
//! an error exit, the same way a chat assistant would reply.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use docqa_core::error::RagError;
use docqa_core::models::{ChatMessage, RagAnswer};

use crate::config::Config;
use crate::pipeline::{open_pipeline, Pipeline};

/// Turn a pipeline error into a reply for the user.
pub fn render_error(err: &RagError) -> String {
    match err {
        RagError::NoRelevantContent => "I couldn't find anything about that in your documents. \
             Try rephrasing the question or ingesting more documents."
            .to_string(),
        RagError::InvalidInput(msg) => format!("I can't answer that: {}.", msg),
        RagError::Embedding(_) => format!("I couldn't process your question ({}).", err),
        RagError::Generation(_) => {
            format!("The language model couldn't produce an answer ({}).", err)
        }
        RagError::Cancelled => "Cancelled.".to_string(),
        other => format!("Something went wrong during {}: {}", other.stage(), other),
    }
}

/// Render an answer with its numbered sources.
pub fn render_answer(answer: &RagAnswer) -> String {
    let mut out = answer.answer.clone();
    out.push('\n');
    if !answer.sources.is_empty() {
        out.push_str("\nSources:\n");
        for (i, s) in answer.sources.iter().enumerate() {
            out.push_str(&format!(
                "  [{}] {}, page {} ({}% relevant)\n      {}\n",
                i + 1,
                s.document_title,
                s.page_number,
                s.relevance,
                s.excerpt.replace('\n', " ")
            ));
        }
    }
    out
}

fn document_filter(docs: &[i64]) -> Option<&[i64]> {
    (!docs.is_empty()).then_some(docs)
}

async fn reply(
    pipeline: &Pipeline,
    question: &str,
    top_k: Option<usize>,
    docs: &[i64],
) -> ChatMessage {
    let cancel = CancellationToken::new();
    match pipeline
        .answer_question(question, top_k, document_filter(docs), &cancel)
        .await
    {
        Ok(answer) => ChatMessage::assistant(answer),
        Err(e) => ChatMessage::assistant_error(render_error(&e)),
    }
}

fn render_message(message: &ChatMessage) -> String {
    if message.sources.is_empty() {
        return format!("{}\n", message.content);
    }
    render_answer(&RagAnswer {
        answer: message.content.clone(),
        sources: message.sources.clone(),
    })
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    top_k: Option<usize>,
    docs: &[i64],
) -> Result<()> {
    let pipeline = open_pipeline(config).await?;
    let message = reply(&pipeline, question, top_k, docs).await;
    print!("{}", render_message(&message));
    pipeline.shutdown().await;
    Ok(())
}

/// Interactive conversation. `/reset` starts over, `/quit` or EOF exits.
///
/// Conversation context lives in the generator session; this loop only
/// reads questions and prints replies.
pub async fn run_chat(config: &Config, docs: &[i64]) -> Result<()> {
    let pipeline = open_pipeline(config).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Ask a question about your documents. /reset starts over, /quit exits.");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                pipeline.new_conversation().await?;
                println!("Started a new conversation.");
                continue;
            }
            _ => {}
        }

        let message = reply(&pipeline, input, None, docs).await;
        print!("{}", render_message(&message));
    }

    pipeline.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::models::SourceCitation;

    #[test]
    fn no_relevant_content_is_conversational() {
        let msg = render_error(&RagError::NoRelevantContent);
        assert!(msg.starts_with("I couldn't find"));
    }

    #[test]
    fn storage_errors_name_their_stage() {
        let msg = render_error(&RagError::Index("disk full".to_string()));
        assert!(msg.contains("storage"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn answer_lists_sources() {
        let answer = RagAnswer {
            answer: "Forty-two.".to_string(),
            sources: vec![SourceCitation {
                document_id: 1,
                document_title: "Guide".to_string(),
                page_number: 3,
                excerpt: "The answer\nis 42".to_string(),
                relevance: 87,
            }],
        };
        let out = render_answer(&answer);
        assert!(out.starts_with("Forty-two.\n"));
        assert!(out.contains("[1] Guide, page 3 (87% relevant)"));
        assert!(out.contains("The answer is 42"));
    }

    #[test]
    fn empty_filter_means_all_documents() {
        assert_eq!(document_filter(&[]), None);
        assert_eq!(document_filter(&[4, 5]), Some(&[4i64, 5][..]));
    }
}
