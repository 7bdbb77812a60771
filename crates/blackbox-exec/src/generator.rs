use std::sync::Arc;

use blackbox_core::config::DEFAULT_API_KEY_ENV;
use blackbox_core::prompt::build_prompt;
use blackbox_core::prompt::SystemPrompt;
use blackbox_core::ContentGenerator;
use blackbox_core::ContentStream;
use blackbox_core::GenerationError;
use blackbox_core::GenerationRequest;
use blackbox_core::StreamChunk;

use crate::backends::LlmBackend;
use crate::backends::TextStream;
use crate::fragments;

/// Checks preconditions, serializes the prompt and turns every failure into
/// a single closing fragment.
pub struct StreamingGenerator {
    backend: Arc<dyn LlmBackend>,
    system_prompt: SystemPrompt,
    api_key_env: String,
}

impl StreamingGenerator {
    pub fn new(backend: Arc<dyn LlmBackend>, system_prompt: SystemPrompt) -> Self {
        Self {
            backend,
            system_prompt,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }

    /// Variable named in the configuration-error fragment.
    pub fn with_api_key_env(mut self, api_key_env: impl Into<String>) -> Self {
        self.api_key_env = api_key_env.into();
        self
    }
}

impl ContentGenerator for StreamingGenerator {
    fn generate(&self, request: GenerationRequest) -> ContentStream {
        let phase = match self.backend.check_ready().and_then(|()| {
            build_prompt(
                &self.system_prompt,
                &request.history,
                request.max_history_length,
                request.quiet_mode,
            )
        }) {
            Ok(prompt) => Phase::Pending(prompt),
            Err(error) => Phase::Failed(error),
        };
        Box::new(GenerationStream {
            backend: Arc::clone(&self.backend),
            api_key_env: self.api_key_env.clone(),
            phase,
            chunks: 0,
        })
    }
}

enum Phase {
    /// Nothing sent upstream yet.
    Pending(String),
    Streaming(TextStream),
    Failed(GenerationError),
    Done,
}

struct GenerationStream {
    backend: Arc<dyn LlmBackend>,
    api_key_env: String,
    phase: Phase,
    chunks: usize,
}

impl GenerationStream {
    fn fail(&mut self, error: GenerationError) -> StreamChunk {
        match &error {
            GenerationError::EmptyInput | GenerationError::Configuration => {
                log::warn!("generation not started: {error}")
            }
            _ => log::warn!(
                "{} failed after {} chunks: {error}",
                self.backend.name(),
                self.chunks
            ),
        }
        self.phase = Phase::Done;
        StreamChunk::Failed {
            html: fragments::for_error(&error, &self.api_key_env),
            error,
        }
    }
}

impl Iterator for GenerationStream {
    type Item = StreamChunk;

    fn next(&mut self) -> Option<StreamChunk> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Pending(prompt) => match self.backend.open(&prompt) {
                    Ok(stream) => self.phase = Phase::Streaming(stream),
                    Err(error) => return Some(self.fail(error)),
                },
                Phase::Streaming(mut stream) => match stream.next() {
                    Some(Ok(text)) => {
                        self.phase = Phase::Streaming(stream);
                        if !text.is_empty() {
                            self.chunks += 1;
                            return Some(StreamChunk::Html(text));
                        }
                    }
                    Some(Err(error)) => return Some(self.fail(error)),
                    None => {
                        log::debug!("{} finished after {} chunks", self.backend.name(), self.chunks);
                        return None;
                    }
                },
                Phase::Failed(error) => return Some(self.fail(error)),
                Phase::Done => return None,
            }
        }
    }
}
