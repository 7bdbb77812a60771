pub(super) use super::build_interaction;
pub(super) use super::reduce;
pub(super) use super::window_title;
pub(super) use crate::actions::RuntimeAction;
pub(super) use crate::actions::SessionAction;
pub(super) use crate::actions::SessionEffect;
pub(super) use crate::actions::SettingsUpdate;
pub(super) use crate::actions::StateReplacement;
pub(super) use crate::actions::UserAction;
pub(super) use crate::interaction::InteractionHistory;
pub(super) use crate::interaction::InteractionRecord;
pub(super) use crate::state::SessionSettings;
pub(super) use crate::state::SessionState;
pub(super) use crate::state::TerminalAppearance;
pub(super) use crate::state::ViewMode;
pub(super) use crate::vfs::path_of;
pub(super) use crate::vfs::Vfs;

mod streaming;

fn state() -> SessionState {
    SessionState::default()
}

fn user(state: &mut SessionState, action: UserAction) -> Vec<SessionEffect> {
    reduce(state, SessionAction::User(action))
}

fn runtime(state: &mut SessionState, action: RuntimeAction) -> Vec<SessionEffect> {
    reduce(state, SessionAction::Runtime(action))
}

fn open(state: &mut SessionState, app_id: &str) -> Vec<SessionEffect> {
    user(
        state,
        UserAction::OpenApp {
            app_id: app_id.to_string(),
        },
    )
}

fn click(id: &str, app: &str) -> InteractionRecord {
    InteractionRecord::new(id, "click", "button", id, Some(app))
}

fn click_with(id: &str, app: &str, value: &str) -> InteractionRecord {
    click(id, app).with_value(value)
}

fn generated_turn(effects: &[SessionEffect]) -> u64 {
    effects
        .iter()
        .find_map(|effect| match effect {
            SessionEffect::Generate { turn, .. } => Some(*turn),
            _ => None,
        })
        .expect("expected a generation request")
}

/// Streams `html` into the current turn and completes it.
fn finish_turn(state: &mut SessionState, html: &str) -> Vec<SessionEffect> {
    let turn = state.turn;
    runtime(
        state,
        RuntimeAction::AppendChunk {
            turn,
            text: html.to_string(),
        },
    );
    runtime(state, RuntimeAction::CompleteStream { turn })
}
