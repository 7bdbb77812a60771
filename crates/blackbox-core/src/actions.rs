use super::error::GenerationError;
use super::generation::GenerationRequest;
use super::interaction::InteractionHistory;
use super::interaction::InteractionRecord;
use super::state::ColorScheme;
use super::state::SessionSettings;
use super::state::TerminalAppearance;
use super::vfs::Vfs;

#[derive(Debug, Clone)]
pub enum SessionAction {
    User(UserAction),
    Runtime(RuntimeAction),
}

#[derive(Debug, Clone)]
pub enum UserAction {
    OpenApp {
        app_id: String,
    },
    /// Close through the window chrome. `live_buffer` is the editor's current
    /// text when the notepad is open.
    RequestClose {
        live_buffer: Option<String>,
    },
    /// Close after the user agreed to discard unsaved changes.
    ConfirmClose,
    Interact(InteractionRecord),
    StateUpdate {
        vfs: Option<Vfs>,
        path: Option<Vec<String>>,
    },
    SystemCommand(String),
    UploadFile {
        name: String,
        contents: String,
    },
    ToggleParameters,
    ApplySettings(SettingsUpdate),
    UpdateTerminal(TerminalUpdate),
    ClearHistory,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub max_history_length: Option<usize>,
    pub statefulness: Option<bool>,
    pub quiet_mode: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminalUpdate {
    pub color_scheme: Option<ColorScheme>,
    pub font_size: Option<u8>,
}

/// Fields replaced wholesale when a saved snapshot is restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateReplacement {
    pub active_app: Option<String>,
    pub history: InteractionHistory,
    pub path: Vec<String>,
    pub vfs: Vfs,
    pub terminal_history: Vec<String>,
    pub settings: SessionSettings,
    pub terminal: TerminalAppearance,
}

#[derive(Debug, Clone)]
pub enum RuntimeAction {
    ServeFromCache {
        turn: u64,
        content: String,
    },
    AppendChunk {
        turn: u64,
        text: String,
    },
    StreamFailed {
        turn: u64,
        html: String,
        error: GenerationError,
    },
    CompleteStream {
        turn: u64,
    },
    /// Content with consumed signal elements removed.
    SettleContent {
        turn: u64,
        content: String,
    },
    ReplaceState(Box<StateReplacement>),
    SetNotepadBaseline(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Start a turn. The driver serves it from the cache when statefulness
    /// is on and `path` has an entry, otherwise opens a stream.
    Generate {
        turn: u64,
        path: Vec<String>,
        request: GenerationRequest,
    },
    CancelGeneration,
    ClearCache,
    StoreInCache {
        path: Vec<String>,
        content: String,
    },
    CaptureNotepadBaseline,
    ConfirmDiscardChanges,
}
