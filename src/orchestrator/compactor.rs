use log::{ info, warn };

use crate::history::render_transcript;
use crate::llm::chat::PromptMessage;
use crate::llm::ModelGateway;
use crate::models::chat::HistoryMessage;

pub const DEFAULT_RECENT_WINDOW: usize = 10;
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 16;
pub const SUMMARY_MARKER: &str = "[Conversation Summary — earlier messages condensed]";

const SUMMARY_MAX_TOKENS: u32 = 400;

/// Keeps the context sent to the models bounded by condensing older turns
/// into one synthetic system message.
#[derive(Clone)]
pub struct ContextCompactor {
    gateway: ModelGateway,
    instruction: String,
    recent_window: usize,
    threshold: usize,
}

impl ContextCompactor {
    pub fn new(gateway: ModelGateway, instruction: impl Into<String>) -> Self {
        Self {
            gateway,
            instruction: instruction.into(),
            recent_window: DEFAULT_RECENT_WINDOW,
            threshold: DEFAULT_COMPACTION_THRESHOLD,
        }
    }

    pub fn with_limits(mut self, recent_window: usize, threshold: usize) -> Self {
        self.recent_window = recent_window.max(1);
        self.threshold = threshold.max(self.recent_window);
        self
    }

    /// Returns `history` untouched up to the threshold. Past it, returns the
    /// summary message followed by the last `recent_window` entries, or just
    /// those entries when summarisation fails.
    pub async fn compact(&self, history: Vec<HistoryMessage>) -> Vec<HistoryMessage> {
        if history.len() <= self.threshold {
            return history;
        }

        let mut older = history;
        let recent = older.split_off(older.len() - self.recent_window);

        let request = vec![
            PromptMessage::system(self.instruction.clone()),
            PromptMessage::user(render_transcript(&older))
        ];

        match self.gateway.generate(request, Some(SUMMARY_MAX_TOKENS)).await {
            Ok(summary) => {
                info!("Compacted {} older messages into a summary", older.len());
                let mut compacted = Vec::with_capacity(recent.len() + 1);
                compacted.push(HistoryMessage::system(format!("{}\n{}", SUMMARY_MARKER, summary.trim())));
                compacted.extend(recent);
                compacted
            }
            Err(e) => {
                warn!("Summarization failed, keeping only the recent window: {}", e);
                recent
            }
        }
    }
}
