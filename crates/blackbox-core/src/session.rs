//! Drives the reducer: runs its effects, owns the response cache and the one
//! stream allowed to feed the current turn, and keeps the interaction bridge
//! attached to whatever content is on screen.

use std::collections::VecDeque;

use super::actions::RuntimeAction;
use super::actions::SessionAction;
use super::actions::SessionEffect;
use super::actions::UserAction;
use super::bridge::ClickTarget;
use super::bridge::ContentView;
use super::bridge::InteractionBridge;
use super::bridge::ScriptHost;
use super::bridge::Signal;
use super::bridge::NOTEPAD_TEXTAREA_ID;
use super::cache::ResponseCache;
use super::error::SettingsError;
use super::generation::ContentGenerator;
use super::generation::ContentStream;
use super::generation::StreamChunk;
use super::interaction::InteractionRecord;
use super::interaction::NOTES_APP;
use super::persistence::PersistedSnapshot;
use super::reducer::reduce;
use super::reducer::window_title;
use super::settings::SettingsDraft;
use super::state::SessionState;
use super::vfs::Vfs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    /// The notepad has unsaved edits; call `confirm_close` to discard them.
    NeedsConfirmation,
}

struct ActiveStream {
    turn: u64,
    chunks: ContentStream,
}

pub struct Session<G: ContentGenerator> {
    state: SessionState,
    cache: ResponseCache,
    generator: G,
    stream: Option<ActiveStream>,
    bridge: InteractionBridge,
}

impl<G: ContentGenerator> Session<G> {
    pub fn new(generator: G, state: SessionState) -> Self {
        Self {
            state,
            cache: ResponseCache::new(),
            generator,
            stream: None,
            bridge: InteractionBridge::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn bridge(&self) -> &InteractionBridge {
        &self.bridge
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn window_title(&self) -> String {
        window_title(&self.state)
    }

    pub fn open_app(&mut self, app_id: &str) {
        self.dispatch(SessionAction::User(UserAction::OpenApp {
            app_id: app_id.to_string(),
        }));
    }

    pub fn interact(&mut self, record: InteractionRecord) {
        self.dispatch(SessionAction::User(UserAction::Interact(record)));
    }

    pub fn click(&mut self, target: &ClickTarget) {
        let record = self.bridge.click(target, self.state.active_app());
        self.interact(record);
    }

    pub fn click_targets(&self) -> Vec<ClickTarget> {
        self.bridge.click_targets()
    }

    pub fn set_input(&mut self, id: &str, value: &str) -> bool {
        self.bridge.set_input(id, value)
    }

    pub fn request_close(&mut self) -> CloseOutcome {
        let live_buffer = if self.state.is_active(NOTES_APP) {
            self.bridge.input_value(NOTEPAD_TEXTAREA_ID)
        } else {
            None
        };
        if self.dispatch(SessionAction::User(UserAction::RequestClose { live_buffer })) {
            CloseOutcome::NeedsConfirmation
        } else {
            CloseOutcome::Closed
        }
    }

    pub fn confirm_close(&mut self) {
        self.dispatch(SessionAction::User(UserAction::ConfirmClose));
    }

    pub fn apply_state_update(&mut self, vfs: Option<Vfs>, path: Option<Vec<String>>) {
        self.dispatch(SessionAction::User(UserAction::StateUpdate { vfs, path }));
    }

    pub fn system_command(&mut self, command: &str) {
        self.dispatch(SessionAction::User(UserAction::SystemCommand(
            command.to_string(),
        )));
    }

    pub fn upload_file(&mut self, name: &str, contents: String) {
        self.dispatch(SessionAction::User(UserAction::UploadFile {
            name: name.to_string(),
            contents,
        }));
    }

    pub fn toggle_parameters(&mut self) {
        self.dispatch(SessionAction::User(UserAction::ToggleParameters));
    }

    /// Applies every field of `draft` or, when any is invalid, none.
    pub fn commit_settings(&mut self, draft: &SettingsDraft) -> Result<(), SettingsError> {
        let (settings, terminal) = draft.validate()?;
        self.dispatch(SessionAction::User(UserAction::ApplySettings(settings)));
        self.dispatch(SessionAction::User(UserAction::UpdateTerminal(terminal)));
        Ok(())
    }

    pub fn clear_history(&mut self) {
        self.dispatch(SessionAction::User(UserAction::ClearHistory));
    }

    pub fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot::capture(&self.state)
    }

    /// Replaces the session with `snapshot`. A snapshot with out-of-range
    /// settings is refused and nothing changes.
    pub fn restore(&mut self, snapshot: PersistedSnapshot) -> Result<(), SettingsError> {
        snapshot.check()?;
        self.dispatch(SessionAction::Runtime(RuntimeAction::ReplaceState(
            Box::new(snapshot.into_replacement()),
        )));
        Ok(())
    }

    pub fn capture_notepad_baseline(&mut self) {
        let baseline = self.rendered_notepad();
        self.dispatch(SessionAction::Runtime(RuntimeAction::SetNotepadBaseline(
            baseline,
        )));
    }

    fn rendered_notepad(&mut self) -> Option<String> {
        self.sync_bridge();
        self.bridge
            .view()
            .and_then(|view| view.input_value(NOTEPAD_TEXTAREA_ID))
    }

    pub fn history_previous(&mut self) -> Option<String> {
        self.bridge.sync_terminal_history(&self.state.terminal_history);
        self.bridge.history_previous()
    }

    pub fn history_next(&mut self) -> Option<String> {
        self.bridge.sync_terminal_history(&self.state.terminal_history);
        self.bridge.history_next()
    }

    pub fn run_scripts(&mut self, host: &mut dyn ScriptHost) -> usize {
        self.bridge.run_scripts(self.state.loading, host)
    }

    /// Applies the next chunk of the active stream. Returns whether the
    /// stream is still open.
    pub fn pump(&mut self) -> bool {
        let Some(active) = self.stream.as_mut() else {
            return false;
        };
        let turn = active.turn;
        match active.chunks.next() {
            Some(StreamChunk::Html(text)) => {
                self.dispatch(SessionAction::Runtime(RuntimeAction::AppendChunk {
                    turn,
                    text,
                }));
            }
            Some(StreamChunk::Failed { html, error }) => {
                log::warn!("turn {turn} failed: {error}");
                self.dispatch(SessionAction::Runtime(RuntimeAction::StreamFailed {
                    turn,
                    html,
                    error,
                }));
            }
            None => {
                self.stream = None;
                self.finish_turn(turn);
            }
        }
        self.stream.is_some()
    }

    /// Pumps until the active stream ends. Returns the number of chunks.
    pub fn drain(&mut self) -> usize {
        let mut chunks = 0;
        while self.pump() {
            chunks += 1;
        }
        log::debug!("stream drained after {chunks} chunks");
        chunks
    }

    fn finish_turn(&mut self, turn: u64) {
        if turn == self.state.turn && self.state.loading {
            self.consume_signals(turn);
        }
        self.dispatch(SessionAction::Runtime(RuntimeAction::CompleteStream { turn }));
    }

    fn consume_signals(&mut self, turn: u64) {
        let mut view = ContentView::parse(&self.state.content);
        let signals = view.take_signals();
        if signals.is_empty() {
            return;
        }
        self.dispatch(SessionAction::Runtime(RuntimeAction::SettleContent {
            turn,
            content: view.to_html(),
        }));
        for signal in signals {
            match signal {
                Signal::StateUpdate { vfs, path } => self.apply_state_update(vfs, path),
                Signal::SystemCommand(command) => self.system_command(&command),
            }
        }
    }

    /// Reduces `action` and runs the resulting effects. Returns whether the
    /// user has to confirm discarding changes.
    fn dispatch(&mut self, action: SessionAction) -> bool {
        let mut confirm = false;
        let mut pending = VecDeque::from(reduce(&mut self.state, action));
        while let Some(effect) = pending.pop_front() {
            match effect {
                SessionEffect::Generate {
                    turn,
                    path,
                    request,
                } => {
                    self.stream = None;
                    let cached = self
                        .cache
                        .get(&path)
                        .filter(|_| self.state.settings.statefulness)
                        .map(str::to_string);
                    match cached {
                        Some(content) => {
                            log::debug!("cache hit for /{}", path.join("/"));
                            pending.extend(reduce(
                                &mut self.state,
                                SessionAction::Runtime(RuntimeAction::ServeFromCache {
                                    turn,
                                    content,
                                }),
                            ));
                        }
                        None => {
                            log::debug!("requesting turn {turn} for /{}", path.join("/"));
                            self.stream = Some(ActiveStream {
                                turn,
                                chunks: self.generator.generate(request),
                            });
                        }
                    }
                }
                SessionEffect::CancelGeneration => {
                    if self.stream.take().is_some() {
                        log::debug!("cancelled in-flight generation");
                    }
                }
                SessionEffect::ClearCache => self.cache.clear(),
                SessionEffect::StoreInCache { path, content } => {
                    if self.cache.store(&path, &content) {
                        log::debug!("cached /{}", path.join("/"));
                    }
                }
                SessionEffect::CaptureNotepadBaseline => {
                    let baseline = self.rendered_notepad();
                    pending.extend(reduce(
                        &mut self.state,
                        SessionAction::Runtime(RuntimeAction::SetNotepadBaseline(baseline)),
                    ));
                }
                SessionEffect::ConfirmDiscardChanges => confirm = true,
            }
        }
        self.sync_bridge();
        confirm
    }

    /// Partial content is not parsed; the view attaches once the turn settles.
    fn sync_bridge(&mut self) {
        if self.state.active_app.is_none() || self.state.loading {
            self.bridge.detach();
        } else {
            self.bridge
                .attach(&self.state.content, self.state.content_rev);
        }
        self.bridge.sync_terminal_history(&self.state.terminal_history);
    }
}
