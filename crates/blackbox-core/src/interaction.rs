use std::collections::VecDeque;

use serde::Deserialize;
use serde::Serialize;

use super::vfs::Vfs;

pub const TERMINAL_APP: &str = "terminal_app";
pub const FILE_EXPLORER_APP: &str = "file_explorer_app";
pub const NOTES_APP: &str = "notes_app";

pub const FILE_EXPLORER_OPEN_DIR: &str = "file_explorer_open_dir";
pub const FILE_EXPLORER_OPEN_FILE: &str = "file_explorer_open_file";
pub const FILE_EXPLORER_UP: &str = "file_explorer_up";
pub const TERMINAL_RUN_COMMAND: &str = "terminal_run_command";
pub const TERMINAL_FILE_UPLOADED: &str = "terminal_file_uploaded";

pub const DEFAULT_INTERACTION_KIND: &str = "generic_click";
pub const MAX_LABEL_CHARS: usize = 75;
pub const MAX_HISTORY_BOUND: usize = 10;

/// Apps whose interactions carry the file system and current path.
pub fn is_fs_aware(app_context: Option<&str>) -> bool {
    matches!(app_context, Some(TERMINAL_APP) | Some(FILE_EXPLORER_APP))
}

/// One captured user or system action. Built once, then only ever moved into
/// the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub element_kind: String,
    pub element_label: String,
    pub app_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vfs: Option<Vfs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_history: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
}

impl InteractionRecord {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        element_kind: impl Into<String>,
        element_label: &str,
        app_context: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            value: None,
            element_kind: element_kind.into(),
            element_label: clip_label(element_label),
            app_context: app_context.map(str::to_string),
            vfs: None,
            terminal_history: None,
            path: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn app_opened(app_id: &str, app_name: &str, path: Vec<String>) -> Self {
        let mut record = Self::new(app_id, "app_open", "icon", app_name, Some(app_id));
        record.path = Some(path);
        record
    }

    pub fn file_uploaded(file_name: &str, vfs: Vfs) -> Self {
        let mut record = Self::new(
            TERMINAL_FILE_UPLOADED,
            "system_event",
            "system",
            "File Upload",
            Some(TERMINAL_APP),
        )
        .with_value(format!("File \"{file_name}\" uploaded successfully."));
        record.vfs = Some(vfs);
        record
    }

    pub fn app_context(&self) -> Option<&str> {
        self.app_context.as_deref()
    }

    /// Label shown in history listings: the element text, else the id.
    pub fn display_label(&self) -> &str {
        if self.element_label.is_empty() {
            &self.id
        } else {
            &self.element_label
        }
    }

    /// The record without its file system snapshot, for verbatim dumps.
    pub fn without_vfs(&self) -> Self {
        Self {
            vfs: None,
            ..self.clone()
        }
    }
}

pub fn clip_label(text: &str) -> String {
    text.trim().chars().take(MAX_LABEL_CHARS).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionHistory {
    entries: VecDeque<InteractionRecord>,
}

impl InteractionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<InteractionRecord>) -> Self {
        Self {
            entries: records.into(),
        }
    }

    /// A new history with `record` at the head and at most `bound` entries.
    pub fn recorded(&self, record: InteractionRecord, bound: usize) -> Self {
        let mut entries = VecDeque::with_capacity(bound.max(1));
        entries.push_back(record);
        entries.extend(
            self.entries
                .iter()
                .take(bound.saturating_sub(1))
                .cloned(),
        );
        entries.truncate(bound);
        Self { entries }
    }

    pub fn truncate(&mut self, bound: usize) {
        self.entries.truncate(bound);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn head(&self) -> Option<&InteractionRecord> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InteractionRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<InteractionRecord> {
        self.entries.iter().cloned().collect()
    }
}
