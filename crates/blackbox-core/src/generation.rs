use super::error::GenerationError;
use super::interaction::InteractionRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Newest first, already bounded.
    pub history: Vec<InteractionRecord>,
    pub max_history_length: usize,
    pub quiet_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Html(String),
    /// The last item of a stream that could not complete. `html` is the
    /// fragment rendered in place of (or after) the generated content.
    Failed {
        html: String,
        error: GenerationError,
    },
}

impl StreamChunk {
    pub fn html(&self) -> &str {
        match self {
            Self::Html(html) | Self::Failed { html, .. } => html,
        }
    }
}

/// Finite, not restartable, and lazy: nothing is requested from upstream
/// until the consumer pulls. Dropping it abandons the request.
pub type ContentStream = Box<dyn Iterator<Item = StreamChunk> + Send>;

pub trait ContentGenerator {
    fn generate(&self, request: GenerationRequest) -> ContentStream;
}
