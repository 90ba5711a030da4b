use futures::{ Stream, StreamExt };
use log::{ error, info };
use serde_json::json;
use std::convert::Infallible;
use std::pin::Pin;

use super::error::ErrorKind;
use crate::llm::chat::{ create_streaming_response, TextStream };
use crate::models::chat::AgentKind;

pub const FALLBACK_REPLY: &str = "I apologize, but I was unable to generate a response. Please try again.";

pub fn phase_marker(phase: &str) -> String {
    format!("\n__PHASE:{}__\n", phase)
}

pub fn error_marker(kind: ErrorKind) -> String {
    let payload = json!({ "errorType": kind.as_str(), "message": kind.user_message() });
    format!("\n__ERROR:{}__\n", payload)
}

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<String, Infallible>> + Send>>;

/// Response body for a chat reply: phase markers, the reply fragments as they
/// arrive, then either nothing, an error marker, or the fallback sentence when
/// the agent produced no fragment at all.
///
/// Stops pulling the reply as soon as the client goes away.
pub fn chat_body(mut reply: TextStream, agent: AgentKind) -> BodyStream {
    create_streaming_response(move |tx| async move {
        for phase in ["routing", "responding"] {
            if tx.send(Ok(phase_marker(phase))).await.is_err() {
                return;
            }
        }

        let mut chunks = 0usize;
        while let Some(item) = reply.next().await {
            match item {
                Ok(chunk) => {
                    chunks += 1;
                    if tx.send(Ok(chunk)).await.is_err() {
                        info!("Client disconnected after {} chunk(s) from {} agent", chunks, agent);
                        return;
                    }
                }
                Err(e) => {
                    error!("Stream error from {} agent: {}", agent, e);
                    let _ = tx.send(Ok(error_marker(ErrorKind::classify(&e)))).await;
                    return;
                }
            }
        }

        if chunks == 0 {
            let _ = tx.send(Ok(FALLBACK_REPLY.to_string())).await;
        }
        info!("Stream finished. Agent: {}, Chunks: {}", agent, chunks);
    })
}
