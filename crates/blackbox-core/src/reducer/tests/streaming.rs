use super::*;
use crate::error::GenerationError;
use pretty_assertions::assert_eq;

#[test]
fn chunks_append_in_arrival_order() {
    let mut state = state();
    let turn = generated_turn(&open(&mut state, "notes_app"));

    for text in ["<div>", "hello", "</div>"] {
        runtime(
            &mut state,
            RuntimeAction::AppendChunk {
                turn,
                text: text.to_string(),
            },
        );
        assert!(state.loading);
    }
    runtime(&mut state, RuntimeAction::CompleteStream { turn });

    assert_eq!(state.content, "<div>hello</div>");
    assert!(!state.loading);
}

#[test]
fn superseded_turns_no_longer_contribute() {
    let mut state = state();
    let first = generated_turn(&open(&mut state, "notes_app"));
    let second = generated_turn(&user(
        &mut state,
        UserAction::Interact(click("notepad_new", "notes_app")),
    ));
    assert_ne!(first, second);

    runtime(
        &mut state,
        RuntimeAction::AppendChunk {
            turn: first,
            text: "stale".to_string(),
        },
    );
    runtime(&mut state, RuntimeAction::CompleteStream { turn: first });
    assert!(state.content.is_empty());
    assert!(state.loading);

    runtime(
        &mut state,
        RuntimeAction::AppendChunk {
            turn: second,
            text: "fresh".to_string(),
        },
    );
    assert_eq!(state.content, "fresh");
}

#[test]
fn failures_append_a_fragment_and_set_the_error() {
    let mut state = state();
    let turn = generated_turn(&open(&mut state, "notes_app"));
    runtime(
        &mut state,
        RuntimeAction::AppendChunk {
            turn,
            text: "<p>partial".to_string(),
        },
    );
    runtime(
        &mut state,
        RuntimeAction::StreamFailed {
            turn,
            html: "<div>boom</div>".to_string(),
            error: GenerationError::Transport("reset".to_string()),
        },
    );
    let effects = runtime(&mut state, RuntimeAction::CompleteStream { turn });

    assert_eq!(state.content, "<p>partial<div>boom</div>");
    assert_eq!(state.error.as_deref(), Some("Failed to stream content from the API."));
    assert!(!state.loading);
    assert!(!effects
        .iter()
        .any(|effect| matches!(effect, SessionEffect::StoreInCache { .. })));
}

#[test]
fn completion_caches_only_with_statefulness() {
    let mut state = state();
    open(&mut state, "web_browser_app");
    assert!(finish_turn(&mut state, "<p>web</p>").is_empty());

    state.settings.statefulness = true;
    open(&mut state, "web_browser_app");
    let effects = finish_turn(&mut state, "<p>web</p>");
    assert_eq!(
        effects,
        vec![SessionEffect::StoreInCache {
            path: path_of(&["web_browser_app"]),
            content: "<p>web</p>".to_string(),
        }]
    );
}

#[test]
fn cache_hit_resolves_the_turn() {
    let mut state = state();
    let turn = generated_turn(&open(&mut state, "web_browser_app"));
    runtime(
        &mut state,
        RuntimeAction::ServeFromCache {
            turn,
            content: "<p>cached</p>".to_string(),
        },
    );
    assert_eq!(state.content, "<p>cached</p>");
    assert!(!state.loading);
}

#[test]
fn settle_replaces_content_of_the_current_turn_only() {
    let mut state = state();
    let turn = generated_turn(&open(&mut state, "terminal_app"));
    let rev = state.content_rev;

    runtime(
        &mut state,
        RuntimeAction::SettleContent {
            turn: turn + 7,
            content: "other".to_string(),
        },
    );
    assert_eq!(state.content_rev, rev);

    runtime(
        &mut state,
        RuntimeAction::SettleContent {
            turn,
            content: "<p>clean</p>".to_string(),
        },
    );
    assert_eq!(state.content, "<p>clean</p>");
    assert!(state.content_rev > rev);
}
