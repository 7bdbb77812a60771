use super::actions::RuntimeAction;
use super::actions::SessionAction;
use super::actions::SessionEffect;
use super::actions::SettingsUpdate;
use super::actions::StateReplacement;
use super::actions::TerminalUpdate;
use super::actions::UserAction;
use super::apps::find_app;
use super::apps::initial_path_for;
use super::error::GenerationError;
use super::generation::GenerationRequest;
use super::interaction::is_fs_aware;
use super::interaction::InteractionHistory;
use super::interaction::InteractionRecord;
use super::interaction::FILE_EXPLORER_APP;
use super::interaction::FILE_EXPLORER_OPEN_DIR;
use super::interaction::FILE_EXPLORER_OPEN_FILE;
use super::interaction::FILE_EXPLORER_UP;
use super::interaction::NOTES_APP;
use super::interaction::TERMINAL_APP;
use super::interaction::TERMINAL_RUN_COMMAND;
use super::state::check_font_size;
use super::state::check_history_length;
use super::state::SessionState;
use super::vfs::VfsNode;

pub const CLOSE_APP_COMMAND: &str = "close_app";
pub const STREAM_ERROR_MESSAGE: &str = "Failed to stream content from the API.";
pub const DESKTOP_TITLE: &str = "Blackbox OS";
pub const NOTEPAD_SAVE_IDS: [&str; 3] = [
    "notepad_save",
    "notepad_save_and_close",
    "notepad_save_and_new",
];

pub fn reduce(state: &mut SessionState, action: SessionAction) -> Vec<SessionEffect> {
    match action {
        SessionAction::User(user) => reduce_user(state, user),
        SessionAction::Runtime(runtime) => reduce_runtime(state, runtime),
    }
}

fn reduce_user(state: &mut SessionState, action: UserAction) -> Vec<SessionEffect> {
    match action {
        UserAction::OpenApp { app_id } => open_app(state, app_id),
        UserAction::RequestClose { live_buffer } => {
            if has_unsaved_notes(state, live_buffer.as_deref()) {
                return vec![SessionEffect::ConfirmDiscardChanges];
            }
            close_app(state)
        }
        UserAction::ConfirmClose => close_app(state),
        UserAction::Interact(record) => {
            let (history, path, terminal_history) = build_interaction(state, record);
            begin_interaction(state, history, path, terminal_history)
        }
        UserAction::StateUpdate { vfs, path } => {
            if let Some(vfs) = vfs {
                state.vfs = vfs;
            }
            if let Some(path) = path {
                state.path = path;
            }
            Vec::new()
        }
        UserAction::SystemCommand(command) => {
            if command == CLOSE_APP_COMMAND {
                close_app(state)
            } else {
                log::warn!("ignoring unknown system command '{command}'");
                Vec::new()
            }
        }
        UserAction::UploadFile { name, contents } => {
            let mut file_path = state.path.clone();
            file_path.push(name.clone());
            match state.vfs.write(&file_path, VfsNode::File(contents)) {
                Ok(vfs) => {
                    state.vfs = vfs.clone();
                    let record = InteractionRecord::file_uploaded(&name, vfs);
                    let (history, path, terminal_history) = build_interaction(state, record);
                    begin_interaction(state, history, path, terminal_history)
                }
                Err(err) => {
                    log::warn!("upload of {name} rejected: {err}");
                    state.error = Some(format!("Upload failed: {err}"));
                    Vec::new()
                }
            }
        }
        UserAction::ToggleParameters => toggle_parameters(state),
        UserAction::ApplySettings(update) => apply_settings(state, update),
        UserAction::UpdateTerminal(update) => {
            apply_terminal(state, update);
            Vec::new()
        }
        UserAction::ClearHistory => {
            state.history.clear();
            state.terminal_history.clear();
            vec![SessionEffect::ClearCache]
        }
    }
}

fn reduce_runtime(state: &mut SessionState, action: RuntimeAction) -> Vec<SessionEffect> {
    match action {
        RuntimeAction::ServeFromCache { turn, content } => {
            if !is_current(state, turn) {
                return Vec::new();
            }
            state.content = content;
            state.loading = false;
            state.content_rev += 1;
            settled_effects(state)
        }
        RuntimeAction::AppendChunk { turn, text } => {
            if is_current(state, turn) {
                state.content.push_str(&text);
                state.content_rev += 1;
            } else {
                log::debug!("dropping chunk from superseded turn {turn}");
            }
            Vec::new()
        }
        RuntimeAction::StreamFailed { turn, html, error } => {
            if is_current(state, turn) {
                state.content.push_str(&html);
                state.error = Some(error_message(&error).to_string());
                state.content_rev += 1;
            }
            Vec::new()
        }
        RuntimeAction::SettleContent { turn, content } => {
            if turn == state.turn && state.content != content {
                state.content = content;
                state.content_rev += 1;
            }
            Vec::new()
        }
        RuntimeAction::CompleteStream { turn } => {
            if !is_current(state, turn) {
                return Vec::new();
            }
            state.loading = false;
            settled_effects(state)
        }
        RuntimeAction::ReplaceState(replacement) => replace_state(state, *replacement),
        RuntimeAction::SetNotepadBaseline(baseline) => {
            state.notepad_baseline = baseline;
            Vec::new()
        }
    }
}

pub fn build_interaction(
    state: &SessionState,
    mut record: InteractionRecord,
) -> (InteractionHistory, Vec<String>, Vec<String>) {
    let mut next_path = state.path.clone();
    if state.is_active(FILE_EXPLORER_APP) {
        match record.id.as_str() {
            FILE_EXPLORER_OPEN_DIR | FILE_EXPLORER_OPEN_FILE => {
                if let Some(name) = record.value.as_deref().filter(|name| !name.is_empty()) {
                    next_path.push(name.to_string());
                }
            }
            FILE_EXPLORER_UP => {
                if next_path.len() > 1 {
                    next_path.pop();
                }
            }
            _ => {}
        }
    }

    let mut terminal_history = state.terminal_history.clone();
    if record.app_context() == Some(TERMINAL_APP) && record.id == TERMINAL_RUN_COMMAND {
        if let Some(command) = record.value.as_deref().filter(|command| !command.is_empty()) {
            terminal_history.push(command.to_string());
        }
    }

    if is_fs_aware(record.app_context()) {
        if record.vfs.is_none() {
            record.vfs = Some(state.vfs.clone());
        }
        record.path = Some(next_path.clone());
    }
    if record.app_context() == Some(TERMINAL_APP) {
        record.terminal_history = Some(terminal_history.clone());
    }

    let history = state
        .history
        .recorded(record, state.settings.max_history_length);
    (history, next_path, terminal_history)
}

fn begin_interaction(
    state: &mut SessionState,
    history: InteractionHistory,
    path: Vec<String>,
    terminal_history: Vec<String>,
) -> Vec<SessionEffect> {
    state.history = history;
    state.path = path;
    state.terminal_history = terminal_history;
    state.loading = true;
    state.error = None;
    state.content.clear();
    state.turn += 1;
    state.content_rev += 1;

    vec![SessionEffect::Generate {
        turn: state.turn,
        path: state.path.clone(),
        request: GenerationRequest {
            history: state.history.to_vec(),
            max_history_length: state.settings.max_history_length,
            quiet_mode: state.settings.quiet_mode,
        },
    }]
}

fn open_app(state: &mut SessionState, app_id: String) -> Vec<SessionEffect> {
    let path = initial_path_for(&app_id);
    let name = find_app(&app_id).map_or(app_id.as_str(), |app| app.name);
    let mut record = InteractionRecord::app_opened(&app_id, name, path.clone());
    if is_fs_aware(Some(&app_id)) {
        record.vfs = Some(state.vfs.clone());
    }
    let terminal_history = if app_id == TERMINAL_APP {
        record.terminal_history = Some(Vec::new());
        Vec::new()
    } else {
        state.terminal_history.clone()
    };
    let history = InteractionHistory::new().recorded(record, state.settings.max_history_length);

    log::info!("opening {app_id} at /{}", path.join("/"));
    state.active_app = Some(app_id);
    state.previous_app = None;
    state.parameters_open = false;
    state.notepad_baseline = None;
    begin_interaction(state, history, path, terminal_history)
}

fn close_app(state: &mut SessionState) -> Vec<SessionEffect> {
    if let Some(app_id) = state.active_app.take() {
        log::info!("closing {app_id}");
    }
    state.content.clear();
    state.error = None;
    state.loading = false;
    state.history.clear();
    state.path.clear();
    state.notepad_baseline = None;
    state.turn += 1;
    state.content_rev += 1;
    vec![SessionEffect::CancelGeneration]
}

fn toggle_parameters(state: &mut SessionState) -> Vec<SessionEffect> {
    if state.parameters_open {
        state.parameters_open = false;
        state.history.clear();
        state.path.clear();
        return match state.previous_app.take() {
            Some(app_id) => open_app(state, app_id),
            None => Vec::new(),
        };
    }

    state.parameters_open = true;
    state.previous_app = state.active_app.take();
    state.content.clear();
    state.error = None;
    state.loading = false;
    state.turn += 1;
    state.content_rev += 1;
    vec![SessionEffect::CancelGeneration]
}

fn apply_settings(state: &mut SessionState, update: SettingsUpdate) -> Vec<SessionEffect> {
    let mut effects = Vec::new();
    if let Some(bound) = update.max_history_length {
        match check_history_length(bound) {
            Ok(bound) => {
                state.settings.max_history_length = bound;
                state.history.truncate(bound);
            }
            Err(err) => log::warn!("keeping history bound {}: {err}", state.settings.max_history_length),
        }
    }
    if let Some(enabled) = update.statefulness {
        state.settings.statefulness = enabled;
        if !enabled {
            effects.push(SessionEffect::ClearCache);
        }
    }
    if let Some(enabled) = update.quiet_mode {
        state.settings.quiet_mode = enabled;
    }
    effects
}

fn apply_terminal(state: &mut SessionState, update: TerminalUpdate) {
    if let Some(scheme) = update.color_scheme {
        state.terminal.color_scheme = scheme;
    }
    if let Some(size) = update.font_size {
        match check_font_size(size) {
            Ok(size) => state.terminal.font_size = size,
            Err(err) => log::warn!("keeping font size {}: {err}", state.terminal.font_size),
        }
    }
}

fn replace_state(state: &mut SessionState, replacement: StateReplacement) -> Vec<SessionEffect> {
    let StateReplacement {
        active_app,
        mut history,
        path,
        vfs,
        terminal_history,
        settings,
        terminal,
    } = replacement;

    let active_app = active_app.filter(|id| {
        let known = find_app(id).is_some();
        if !known {
            log::warn!("snapshot references unknown app {id}");
        }
        known
    });
    let settings = match settings.check() {
        Ok(()) => settings,
        Err(err) => {
            log::warn!("snapshot settings ignored: {err}");
            state.settings
        }
    };
    let terminal = match terminal.check() {
        Ok(()) => terminal,
        Err(err) => {
            log::warn!("snapshot terminal appearance ignored: {err}");
            state.terminal
        }
    };
    history.truncate(settings.max_history_length);

    state.active_app = active_app;
    state.previous_app = None;
    state.parameters_open = false;
    state.vfs = vfs;
    state.settings = settings;
    state.terminal = terminal;
    state.notepad_baseline = None;
    state.content.clear();
    state.error = None;
    state.loading = false;
    state.turn += 1;
    state.content_rev += 1;

    let mut effects = vec![SessionEffect::CancelGeneration];
    if state.active_app.is_some() && !history.is_empty() {
        effects.extend(begin_interaction(state, history, path, terminal_history));
    } else {
        state.history = history;
        state.path = path;
        state.terminal_history = terminal_history;
    }
    effects
}

fn is_current(state: &SessionState, turn: u64) -> bool {
    turn == state.turn && state.loading
}

fn settled_effects(state: &SessionState) -> Vec<SessionEffect> {
    let mut effects = Vec::new();
    if state.settings.statefulness
        && state.error.is_none()
        && !state.content.is_empty()
        && !state.path.is_empty()
    {
        effects.push(SessionEffect::StoreInCache {
            path: state.path.clone(),
            content: state.content.clone(),
        });
    }
    if state.is_active(NOTES_APP) && (state.notepad_baseline.is_none() || last_turn_saved_notes(state)) {
        effects.push(SessionEffect::CaptureNotepadBaseline);
    }
    effects
}

fn last_turn_saved_notes(state: &SessionState) -> bool {
    state.history.head().is_some_and(|record| {
        record.app_context() == Some(NOTES_APP) && NOTEPAD_SAVE_IDS.contains(&record.id.as_str())
    })
}

fn has_unsaved_notes(state: &SessionState, live_buffer: Option<&str>) -> bool {
    if !state.is_active(NOTES_APP) {
        return false;
    }
    matches!(
        (state.notepad_baseline.as_deref(), live_buffer),
        (Some(baseline), Some(live)) if baseline != live
    )
}

pub fn error_message(error: &GenerationError) -> &'static str {
    match error {
        GenerationError::Configuration => "The API key is not configured.",
        GenerationError::EmptyInput => "No interaction data provided.",
        GenerationError::Transport(_) | GenerationError::Decode(_) => STREAM_ERROR_MESSAGE,
    }
}

pub fn window_title(state: &SessionState) -> String {
    let base = match state.active_app() {
        _ if state.parameters_open => DESKTOP_TITLE.to_string(),
        None => DESKTOP_TITLE.to_string(),
        Some(TERMINAL_APP) => format!("Terminal: /{}", state.path.join("/")),
        Some(FILE_EXPLORER_APP) => format!("File System: /{}", state.path.join("/")),
        Some(other) => find_app(other).map_or(other, |app| app.name).to_string(),
    };
    if state.settings.quiet_mode {
        format!("{base} (Quiet Mode)")
    } else {
        base
    }
}

#[cfg(test)]
mod tests;
