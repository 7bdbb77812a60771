use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::process::Child;
use std::process::ChildStdout;
use std::process::Command;
use std::process::Stdio;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use blackbox_core::config::ModelConfig;
use blackbox_core::config::Provider;
use blackbox_core::config::DEFAULT_MODEL;
use blackbox_core::GenerationError;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;

/// Raw model text, pulled on demand. Dropping it abandons the request.
pub type TextStream = Box<dyn Iterator<Item = Result<String, GenerationError>> + Send>;

pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Fails with `Configuration` when a required credential is missing.
    fn check_ready(&self) -> Result<(), GenerationError> {
        Ok(())
    }

    fn open(&self, prompt: &str) -> Result<TextStream, GenerationError>;
}

pub fn backend_from_config(config: &ModelConfig) -> Result<Arc<dyn LlmBackend>, GenerationError> {
    let backend: Arc<dyn LlmBackend> = match config.provider {
        Provider::Gemini => Arc::new(GeminiHttpBackend::new(config)?),
        Provider::Ollama => Arc::new(CliBackend::new(CliProvider::Ollama, &config.model)),
        Provider::GeminiCli => Arc::new(CliBackend::new(CliProvider::GeminiCli, &config.model)),
        Provider::Codex => Arc::new(CliBackend::new(CliProvider::Codex, &config.model)),
    };
    log::info!("using {} backend", backend.name());
    Ok(backend)
}

fn transport(err: impl std::fmt::Display) -> GenerationError {
    GenerationError::Transport(err.to_string())
}

pub struct GeminiHttpBackend {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key_env: String,
}

impl GeminiHttpBackend {
    pub fn new(config: &ModelConfig) -> Result<Self, GenerationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
        })
    }

    fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.endpoint, self.model
        )
    }
}

impl LlmBackend for GeminiHttpBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn check_ready(&self) -> Result<(), GenerationError> {
        self.api_key().map(|_| ()).ok_or(GenerationError::Configuration)
    }

    fn open(&self, prompt: &str) -> Result<TextStream, GenerationError> {
        let api_key = self.api_key().ok_or(GenerationError::Configuration)?;
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });
        log::debug!("POST {} ({} prompt bytes)", self.url(), prompt.len());
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            let detail = serde_json::from_str::<StreamEvent>(&text)
                .ok()
                .and_then(|body| body.error)
                .map(|error| error.to_string())
                .unwrap_or(text);
            return Err(GenerationError::Transport(format!("HTTP {status}: {detail}")));
        }
        Ok(Box::new(SseTextStream::new(BufReader::new(response))))
    }
}

/// Text parts of a `streamGenerateContent?alt=sse` response body.
pub struct SseTextStream<R> {
    lines: std::io::Lines<R>,
    done: bool,
}

impl<R: BufRead> SseTextStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for SseTextStream<R> {
    type Item = Result<String, GenerationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    self.done = true;
                    return Some(Err(transport(err)));
                }
            };
            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                continue;
            };
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            match sse_event_text(data) {
                Ok(Some(text)) => return Some(Ok(text)),
                Ok(None) => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// One `data:` payload of the SSE body, or the JSON body of a failed
/// request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StreamEvent {
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiError {
    code: Option<u16>,
    message: Option<String>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.message, self.code) {
            (Some(message), _) => f.write_str(message),
            (None, Some(code)) => write!(f, "API error {code}"),
            (None, None) => f.write_str("unknown API error"),
        }
    }
}

fn sse_event_text(data: &str) -> Result<Option<String>, GenerationError> {
    let event = serde_json::from_str::<StreamEvent>(data)
        .map_err(|err| GenerationError::Transport(format!("malformed stream event: {err}")))?;
    if let Some(error) = event.error {
        return Err(GenerationError::Transport(error.to_string()));
    }
    let text = event
        .candidates
        .into_iter()
        .next()
        .map(|candidate| {
            candidate
                .content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();
    Ok((!text.is_empty()).then_some(text))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliProvider {
    Ollama,
    GeminiCli,
    Codex,
}

impl CliProvider {
    pub fn label(self) -> &'static str {
        match self {
            Self::Ollama => "Ollama",
            Self::GeminiCli => "Gemini CLI",
            Self::Codex => "Codex CLI",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "phi3:mini-128k",
            Self::GeminiCli => DEFAULT_MODEL,
            Self::Codex => "gpt-5",
        }
    }

    fn command(self, model: &str, prompt: &str) -> Command {
        match self {
            Self::Ollama => {
                let mut cmd = Command::new("ollama");
                cmd.args(["run", "--nowordwrap", model, prompt]);
                cmd
            }
            Self::GeminiCli => {
                let mut cmd = Command::new("gemini");
                cmd.arg("-p")
                    .arg(prompt)
                    .arg("--output-format")
                    .arg("stream-json")
                    .arg("-m")
                    .arg(model);
                cmd
            }
            Self::Codex => {
                let mut cmd = Command::new("codex");
                cmd.arg("exec")
                    .arg("--skip-git-repo-check")
                    .arg("--json")
                    .arg("-m")
                    .arg(model)
                    .arg(prompt);
                cmd
            }
        }
    }
}

/// A local model CLI spawned once per turn.
pub struct CliBackend {
    provider: CliProvider,
    model: String,
}

impl CliBackend {
    /// The Gemini REST default model is replaced by the provider's own
    /// default for providers that cannot run it.
    pub fn new(provider: CliProvider, model: &str) -> Self {
        let model = if model.trim().is_empty()
            || (model == DEFAULT_MODEL && provider != CliProvider::GeminiCli)
        {
            provider.default_model()
        } else {
            model
        };
        Self {
            provider,
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl LlmBackend for CliBackend {
    fn name(&self) -> &str {
        self.provider.label()
    }

    fn open(&self, prompt: &str) -> Result<TextStream, GenerationError> {
        let mut cmd = self.provider.command(&self.model, prompt);
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                GenerationError::Transport(format!(
                    "Failed to start {}: {err}",
                    self.provider.label()
                ))
            })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            GenerationError::Transport(format!("{} has no stdout", self.provider.label()))
        })?;
        let stderr = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });
        Ok(Box::new(ChildStream {
            provider: self.provider,
            child,
            stdout: BufReader::new(stdout),
            stderr,
            pending: Vec::new(),
            assistant_so_far: String::new(),
            saw_delta: false,
            finished: false,
        }))
    }
}

/// Output of a running CLI. The child is killed when this is dropped early.
struct ChildStream {
    provider: CliProvider,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    /// Bytes of a UTF-8 sequence split across reads.
    pending: Vec<u8>,
    assistant_so_far: String,
    saw_delta: bool,
    finished: bool,
}

impl ChildStream {
    /// `Ok(None)` at end of output.
    fn read_text(&mut self) -> Result<Option<String>, GenerationError> {
        match self.provider {
            CliProvider::Ollama => {
                let buf = self.stdout.fill_buf().map_err(transport)?;
                if buf.is_empty() {
                    let rest = String::from_utf8_lossy(&self.pending).into_owned();
                    self.pending.clear();
                    return Ok((!rest.is_empty()).then_some(rest));
                }
                let read = buf.len();
                self.pending.extend_from_slice(buf);
                self.stdout.consume(read);
                Ok(Some(strip_ansi_sequences(&take_utf8(&mut self.pending))))
            }
            CliProvider::GeminiCli | CliProvider::Codex => {
                let mut line = String::new();
                if self.stdout.read_line(&mut line).map_err(transport)? == 0 {
                    return Ok(None);
                }
                let line = line.trim();
                if !line.starts_with('{') {
                    if !line.is_empty() {
                        log::debug!("{}: {line}", self.provider.label());
                    }
                    return Ok(Some(String::new()));
                }
                let Ok(event) = serde_json::from_str::<Value>(line) else {
                    log::debug!("{}: unparsable event {line}", self.provider.label());
                    return Ok(Some(String::new()));
                };
                let text = if self.provider == CliProvider::GeminiCli {
                    gemini_cli_text(&event, &mut self.assistant_so_far)
                } else {
                    codex_text(&event, &mut self.assistant_so_far, &mut self.saw_delta)
                };
                Ok(Some(text))
            }
        }
    }

    fn exit_error(&mut self) -> Option<GenerationError> {
        let status = self.child.wait().ok();
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if status.is_some_and(|status| status.success()) {
            return None;
        }
        let label = self.provider.label();
        let stderr = stderr.trim();
        Some(GenerationError::Transport(if stderr.is_empty() {
            format!("{label} exited with a non-zero status.")
        } else {
            format!("{label} error: {stderr}")
        }))
    }
}

impl Iterator for ChildStream {
    type Item = Result<String, GenerationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.read_text() {
                Ok(Some(text)) if text.is_empty() => continue,
                Ok(Some(text)) => return Some(Ok(text)),
                Ok(None) => {
                    self.finished = true;
                    return self.exit_error().map(Err);
                }
                Err(err) => {
                    self.finished = true;
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    return Some(Err(err));
                }
            }
        }
    }
}

impl Drop for ChildStream {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!("stopping {}", self.provider.label());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Splits off the longest valid UTF-8 prefix of `pending`.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(pending).map(str::len) {
        Ok(len) => len,
        Err(err) if err.error_len().is_none() => err.valid_up_to(),
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            return text;
        }
    };
    let rest = pending.split_off(valid);
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = rest;
    text
}

fn strip_ansi_sequences(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            if chars.peek() == Some(&'[') {
                let _ = chars.next();
                for n in chars.by_ref() {
                    if ('@'..='~').contains(&n) {
                        break;
                    }
                }
            }
            continue;
        }
        if c == '\r' {
            continue;
        }
        out.push(c);
    }
    out
}

/// Assistant text of one `gemini --output-format stream-json` event.
fn gemini_cli_text(event: &Value, assistant_so_far: &mut String) -> String {
    if event.get("type").and_then(Value::as_str) != Some("message")
        || event.get("role").and_then(Value::as_str) != Some("assistant")
    {
        return String::new();
    }
    let Some(content) = event
        .get("content")
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
    else {
        return String::new();
    };
    let is_delta = event.get("delta").and_then(Value::as_bool).unwrap_or(false);
    let chunk = if is_delta {
        content
            .strip_prefix(assistant_so_far.as_str())
            .unwrap_or(content)
            .to_string()
    } else {
        content.to_string()
    };
    *assistant_so_far = content.to_string();
    chunk
}

/// Assistant text of one `codex exec --json` event. Completed messages only
/// contribute what the deltas have not already streamed.
fn codex_text(event: &Value, assistant_so_far: &mut String, saw_delta: &mut bool) -> String {
    let event_type = event.get("type").and_then(Value::as_str).unwrap_or_default();
    if event_type == "item.completed" {
        let item = event.get("item").unwrap_or(&Value::Null);
        if item.get("type").and_then(Value::as_str) != Some("agent_message") {
            return String::new();
        }
        let Some(text) = item.get("text").and_then(Value::as_str) else {
            return String::new();
        };
        let suffix = match text.strip_prefix(assistant_so_far.as_str()) {
            Some(rest) => rest,
            None if *saw_delta => "",
            None => text,
        }
        .to_string();
        *assistant_so_far = text.to_string();
        return suffix;
    }
    if event_type.contains("delta") {
        let mut deltas = Vec::new();
        push_delta_strings(event, &mut deltas);
        let joined = deltas.concat();
        if !joined.is_empty() {
            *saw_delta = true;
            assistant_so_far.push_str(&joined);
        }
        return joined;
    }
    String::new()
}

fn push_delta_strings(v: &Value, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, val) in map {
                if let Some(s) = val.as_str() {
                    let key = k.to_ascii_lowercase();
                    if (key.contains("delta") || key == "text" || key == "content") && !s.is_empty() {
                        out.push(s.to_string());
                    }
                }
                push_delta_strings(val, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                push_delta_strings(item, out);
            }
        }
        _ => {}
    }
}

/// Replays fixed chunks. Records every prompt it is opened with.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    chunks: Vec<Result<String, GenerationError>>,
    ready: Result<(), GenerationError>,
    open_error: Option<GenerationError>,
    prompts: Arc<Mutex<Vec<String>>>,
    opened: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new<S: Into<String>>(chunks: impl IntoIterator<Item = S>) -> Self {
        Self {
            chunks: chunks.into_iter().map(|chunk| Ok(chunk.into())).collect(),
            ready: Ok(()),
            open_error: None,
            prompts: Arc::new(Mutex::new(Vec::new())),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Appends a failure after the scripted chunks.
    pub fn then_fail(mut self, error: GenerationError) -> Self {
        self.chunks.push(Err(error));
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.ready = Err(GenerationError::Configuration);
        self
    }

    pub fn failing_to_open(mut self, error: GenerationError) -> Self {
        self.open_error = Some(error);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn check_ready(&self) -> Result<(), GenerationError> {
        self.ready.clone()
    }

    fn open(&self, prompt: &str) -> Result<TextStream, GenerationError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }
        Ok(Box::new(self.chunks.clone().into_iter()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sse_events_yield_their_text_parts() {
        let body = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"<div>\"},{\"text\":\"hi\"}]}}]}\n\n\
                    : keep-alive\n\
                    data: {\"candidates\":[{\"content\":{\"parts\":[]}}],\"usageMetadata\":{}}\n\n\
                    data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"</div>\"}]}}]}\n\n";
        let chunks = SseTextStream::new(Cursor::new(body))
            .collect::<Result<Vec<_>, _>>()
            .expect("chunks");
        assert_eq!(chunks, vec!["<div>hi", "</div>"]);
    }

    #[test]
    fn sse_error_events_end_the_stream() {
        let body = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]}}]}\n\
                    data: {\"error\":{\"code\":429,\"message\":\"quota exceeded\"}}\n\
                    data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"b\"}]}}]}\n";
        let items = SseTextStream::new(Cursor::new(body)).collect::<Vec<_>>();
        assert_eq!(
            items,
            vec![
                Ok("a".to_string()),
                Err(GenerationError::Transport("quota exceeded".to_string())),
            ]
        );
    }

    #[test]
    fn malformed_sse_data_is_a_transport_error() {
        let mut stream = SseTextStream::new(Cursor::new("data: {nope\n"));
        assert!(matches!(stream.next(), Some(Err(GenerationError::Transport(_)))));
        assert_eq!(stream.next(), None);
    }

    #[test]
    fn ansi_sequences_are_removed() {
        assert_eq!(strip_ansi_sequences("\u{1b}[1;32m<p>\u{1b}[0m\r\n"), "<p>\n");
    }

    #[test]
    fn split_utf8_sequences_wait_for_their_tail() {
        let mut pending = "é".as_bytes()[..1].to_vec();
        pending.insert(0, b'a');
        assert_eq!(take_utf8(&mut pending), "a");
        pending.push("é".as_bytes()[1]);
        assert_eq!(take_utf8(&mut pending), "é");
        assert!(pending.is_empty());
    }

    #[test]
    fn gemini_cli_deltas_are_deduplicated() {
        let mut so_far = String::new();
        let first = json!({"type": "message", "role": "assistant", "content": "<p>he", "delta": true});
        let second = json!({"type": "message", "role": "assistant", "content": "<p>hello", "delta": true});
        let user = json!({"type": "message", "role": "user", "content": "ignored"});
        assert_eq!(gemini_cli_text(&first, &mut so_far), "<p>he");
        assert_eq!(gemini_cli_text(&user, &mut so_far), "");
        assert_eq!(gemini_cli_text(&second, &mut so_far), "llo");
    }

    #[test]
    fn codex_final_message_only_adds_the_unseen_tail() {
        let mut so_far = String::new();
        let mut saw_delta = false;
        let delta = json!({"type": "item.delta", "delta": "<p>a"});
        let done = json!({"type": "item.completed", "item": {"type": "agent_message", "text": "<p>ab</p>"}});
        assert_eq!(codex_text(&delta, &mut so_far, &mut saw_delta), "<p>a");
        assert_eq!(codex_text(&done, &mut so_far, &mut saw_delta), "b</p>");
        assert_eq!(
            codex_text(&json!({"type": "turn.completed"}), &mut so_far, &mut saw_delta),
            ""
        );
    }

    #[test]
    fn cli_backends_swap_in_their_own_default_model() {
        assert_eq!(CliBackend::new(CliProvider::Ollama, DEFAULT_MODEL).model(), "phi3:mini-128k");
        assert_eq!(CliBackend::new(CliProvider::GeminiCli, DEFAULT_MODEL).model(), DEFAULT_MODEL);
        assert_eq!(CliBackend::new(CliProvider::Codex, "o4-mini").model(), "o4-mini");
    }

    #[test]
    fn gemini_backend_needs_its_key_variable() {
        let config = ModelConfig {
            api_key_env: "BLACKBOX_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ModelConfig::default()
        };
        let backend = GeminiHttpBackend::new(&config).expect("client");
        assert_eq!(backend.check_ready(), Err(GenerationError::Configuration));
        assert!(matches!(
            backend.open("prompt"),
            Err(GenerationError::Configuration)
        ));
        assert!(backend.url().ends_with("/models/gemini-2.5-flash:streamGenerateContent?alt=sse"));
    }
}
