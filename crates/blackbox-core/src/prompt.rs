//! Turns an interaction history into the text sent to the model.
//!
//! The serializer only renders. Bounding the history is the state machine's
//! job and has already happened by the time a prompt is built.

use std::fmt::Write as _;
use std::path::Path;

use super::apps::app_display_name;
use super::error::GenerationError;
use super::interaction::is_fs_aware;
use super::interaction::InteractionRecord;
use super::interaction::TERMINAL_APP;

pub const MAX_VALUE_CHARS: usize = 100;

const BUILTIN_SYSTEM_PROMPT: &str = "\
You are the operating system of a simulated desktop computer. Every screen the \
user sees is HTML that you write for the content area of a single window.

Rules:
- Reply with an HTML fragment only. No markdown fences, no <html> or <body>.
- Every clickable element carries data-interaction-id and, where useful, \
data-interaction-type and data-interaction-value. Forms submit several inputs \
at once by listing their ids in data-value-from, separated by commas.
- The terminal input has id=\"terminal_input\"; running a command uses \
data-interaction-id=\"terminal_run_command\" with data-value-from=\"terminal_input\".
- The file explorer opens entries with file_explorer_open_dir / \
file_explorer_open_file (value = entry name) and goes up with file_explorer_up.
- The notepad editor is a <textarea id=\"notepad-textarea\">; saving uses \
notepad_save, notepad_save_and_close or notepad_save_and_new.
- To change the file system or the current path, emit \
<div id=\"terminal-state-update\" data-vfs='JSON' data-path='JSON array'></div>.
- To close the current app, emit <div id=\"system-command\" data-command=\"close_app\"></div>.
- A file picker is an <input type=\"file\" id=\"file-upload\">.

You remember at most {max_history} previous interactions.
{quiet_mode}";

const QUIET_MODE_ON: &str =
    "Quiet mode is ON: keep text minimal, no commentary, show only what the app would show.";
const QUIET_MODE_OFF: &str = "Quiet mode is OFF: narration and flavour text are welcome.";

/// The preamble placed before the context block. `{max_history}` and
/// `{quiet_mode}` are substituted on every render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompt {
    template: String,
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::from_template(BUILTIN_SYSTEM_PROMPT)
    }
}

impl SystemPrompt {
    pub fn from_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        std::fs::read_to_string(path).map(Self::from_template)
    }

    pub fn render(&self, max_history: usize, quiet_mode: bool) -> String {
        let quiet = if quiet_mode { QUIET_MODE_ON } else { QUIET_MODE_OFF };
        self.template
            .replace("{max_history}", &max_history.to_string())
            .replace("{quiet_mode}", quiet)
    }
}

pub fn build_prompt(
    system: &SystemPrompt,
    history: &[InteractionRecord],
    max_history: usize,
    quiet_mode: bool,
) -> Result<String, GenerationError> {
    let Some((current, past)) = history.split_first() else {
        return Err(GenerationError::EmptyInput);
    };

    let mut context = String::from("--- START CONTEXT ---\n## Current Interaction\n");
    let _ = writeln!(
        context,
        "- App: {}",
        app_display_name(current.app_context()).unwrap_or("Desktop")
    );
    let _ = writeln!(context, "- Interaction ID: {}", current.id);
    let _ = writeln!(context, "- Interaction Type: {}", current.kind);
    let element_text = if current.element_label.is_empty() {
        if current.id.is_empty() {
            "Unknown Element"
        } else {
            current.id.as_str()
        }
    } else {
        current.element_label.as_str()
    };
    let _ = writeln!(context, "- Element Text: {element_text}");
    match current.value.as_deref().filter(|value| !value.is_empty()) {
        Some(value) => {
            let clipped: String = value.chars().take(MAX_VALUE_CHARS).collect();
            let _ = write!(context, "- Value: '{clipped}'");
        }
        None => context.push_str("- Value: N/A"),
    }

    if is_fs_aware(current.app_context()) {
        let path = current.path.as_deref().unwrap_or_default();
        let vfs = current
            .vfs
            .as_ref()
            .map_or_else(|| "null".to_string(), |vfs| vfs.to_pretty_json());
        let _ = write!(
            context,
            "\n\n## App State\n- Current Path: /{}\n- Virtual File System (VFS): {vfs}",
            path.join("/")
        );
        if current.app_context() == Some(TERMINAL_APP) {
            let commands = serde_json::to_string(&current.terminal_history)
                .unwrap_or_else(|_| "null".to_string());
            let _ = write!(
                context,
                "\n- Terminal Command History (this session): {commands}"
            );
        }
    }

    if !past.is_empty() {
        let _ = write!(
            context,
            "\n\n## Recent History ({} previous interactions)",
            past.len()
        );
        for (index, record) in past.iter().enumerate() {
            let _ = write!(
                context,
                "\n{}. (App: {}) Clicked '{}'",
                index + 1,
                app_display_name(record.app_context()).unwrap_or("N/A"),
                record.display_label()
            );
        }
    }

    let raw = serde_json::to_string_pretty(&current.without_vfs())
        .unwrap_or_else(|_| "{}".to_string());
    let _ = write!(
        context,
        "\n\n## Raw Interaction Data (for reference)\n{raw}\n--- END CONTEXT ---"
    );

    Ok(format!(
        "{}\n\n{context}\n\nBased on the context provided above, generate the HTML content for the window's content area.",
        system.render(max_history, quiet_mode)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::Vfs;

    fn terminal_run(command: &str, history: Vec<String>) -> InteractionRecord {
        let mut record = InteractionRecord::new(
            "terminal_run_command",
            "click",
            "button",
            "Run",
            Some("terminal_app"),
        )
        .with_value(command);
        record.vfs = Some(Vfs::seed());
        record.path = Some(vec!["home".to_string(), "user".to_string()]);
        record.terminal_history = Some(history);
        record
    }

    #[test]
    fn empty_history_is_rejected() {
        let err = build_prompt(&SystemPrompt::default(), &[], 3, false).unwrap_err();
        assert_eq!(err, GenerationError::EmptyInput);
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let past = InteractionRecord::new("open", "click", "div", "Open docs", None);
        let current = terminal_run("ls", vec!["ls".to_string()]);
        let prompt = build_prompt(&SystemPrompt::default(), &[current, past], 3, false).unwrap();

        let order = [
            "You remember at most 3 previous interactions.",
            "## Current Interaction",
            "- App: Terminal",
            "- Value: 'ls'",
            "## App State",
            "- Current Path: /home/user",
            "- Terminal Command History (this session): [\"ls\"]",
            "## Recent History (1 previous interactions)",
            "1. (App: N/A) Clicked 'Open docs'",
            "## Raw Interaction Data (for reference)",
            "--- END CONTEXT ---",
            "generate the HTML content for the window's content area.",
        ];
        let mut cursor = 0;
        for needle in order {
            let found = prompt[cursor..]
                .find(needle)
                .unwrap_or_else(|| panic!("missing or out of order: {needle}"));
            cursor += found + needle.len();
        }
    }

    #[test]
    fn raw_dump_omits_the_file_system() {
        let prompt = build_prompt(
            &SystemPrompt::default(),
            &[terminal_run("pwd", Vec::new())],
            3,
            false,
        )
        .unwrap();
        let raw = prompt
            .split("## Raw Interaction Data (for reference)")
            .nth(1)
            .unwrap();
        assert!(!raw.contains("\"vfs\""));
        assert!(raw.contains("\"terminal_history\""));
        assert!(!prompt.contains("## Recent History"));
    }

    #[test]
    fn app_state_only_for_file_aware_apps() {
        let mut record = InteractionRecord::new("save", "click", "button", "Save", Some("notes_app"))
            .with_value("x".repeat(250));
        record.vfs = Some(Vfs::seed());
        let prompt = build_prompt(&SystemPrompt::default(), &[record], 0, true).unwrap();

        assert!(!prompt.contains("## App State"));
        assert!(prompt.contains(&format!("- Value: '{}'\n", "x".repeat(MAX_VALUE_CHARS))));
        assert!(prompt.contains(QUIET_MODE_ON));
    }

    #[test]
    fn custom_templates_are_substituted() {
        let system = SystemPrompt::from_template("bound={max_history}");
        assert_eq!(system.render(7, false), "bound=7");
    }
}
