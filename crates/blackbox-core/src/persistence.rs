use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::actions::StateReplacement;
use super::error::SettingsError;
use super::error::SnapshotError;
use super::interaction::InteractionHistory;
use super::state::check_font_size;
use super::state::check_history_length;
use super::state::ColorScheme;
use super::state::SessionSettings;
use super::state::SessionState;
use super::state::TerminalAppearance;
use super::vfs::Vfs;

pub const SNAPSHOT_VERSION: u8 = 1;
pub const SNAPSHOT_FILE_NAME: &str = "blackbox_state.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub version: u8,
    pub saved_at_ms: i64,
    pub active_app_id: Option<String>,
    pub interaction_history: InteractionHistory,
    pub current_path: Vec<String>,
    pub vfs: Vfs,
    pub terminal_history: Vec<String>,
    pub max_history_length: usize,
    pub statefulness: bool,
    pub quiet_mode: bool,
    pub terminal_color_scheme: ColorScheme,
    pub terminal_font_size: u8,
}

impl PersistedSnapshot {
    pub fn capture(state: &SessionState) -> Self {
        let active_app_id = state
            .active_app
            .clone()
            .or_else(|| state.previous_app.clone());
        Self {
            version: SNAPSHOT_VERSION,
            saved_at_ms: chrono::Utc::now().timestamp_millis(),
            active_app_id,
            interaction_history: state.history.clone(),
            current_path: state.path.clone(),
            vfs: state.vfs.clone(),
            terminal_history: state.terminal_history.clone(),
            max_history_length: state.settings.max_history_length,
            statefulness: state.settings.statefulness,
            quiet_mode: state.settings.quiet_mode,
            terminal_color_scheme: state.terminal.color_scheme,
            terminal_font_size: state.terminal.font_size,
        }
    }

    pub fn check(&self) -> Result<(), SettingsError> {
        check_history_length(self.max_history_length)?;
        check_font_size(self.terminal_font_size)?;
        Ok(())
    }

    pub fn into_replacement(self) -> StateReplacement {
        StateReplacement {
            active_app: self.active_app_id,
            history: self.interaction_history,
            path: self.current_path,
            vfs: self.vfs,
            terminal_history: self.terminal_history,
            settings: SessionSettings {
                max_history_length: self.max_history_length,
                statefulness: self.statefulness,
                quiet_mode: self.quiet_mode,
            },
            terminal: TerminalAppearance {
                color_scheme: self.terminal_color_scheme,
                font_size: self.terminal_font_size,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join("blackbox"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SNAPSHOT_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let encoded = serde_json::to_vec_pretty(snapshot)?;
        let mut opts = OpenOptions::new();
        opts.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts.open(&self.path)?;
        file.write_all(&encoded)?;
        file.flush()?;
        log::info!("saved session snapshot to {}", self.path.display());
        Ok(())
    }

    pub fn load(&self) -> Result<Option<PersistedSnapshot>, SnapshotError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.path)?;
        let snapshot = serde_json::from_slice::<PersistedSnapshot>(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            log::warn!(
                "snapshot version {} differs from {SNAPSHOT_VERSION}, loading anyway",
                snapshot.version
            );
        }
        log::info!("loaded session snapshot from {}", self.path.display());
        Ok(Some(snapshot))
    }

    pub fn clear(&self) -> Result<(), SnapshotError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::PersistedSnapshot;
    use super::SnapshotStore;
    use crate::interaction::InteractionHistory;
    use crate::interaction::InteractionRecord;
    use crate::state::ColorScheme;
    use crate::state::SessionState;
    use crate::vfs::path_of;
    use crate::vfs::VfsNode;
    use pretty_assertions::assert_eq;

    fn populated_state() -> SessionState {
        let mut state = SessionState::default();
        state.active_app = Some("terminal_app".to_string());
        state.path = path_of(&["home", "user"]);
        state.vfs = state
            .vfs
            .write(&path_of(&["tmp", "scan.log"]), VfsNode::file("22/tcp open"))
            .expect("write");
        state.history = InteractionHistory::from_records(vec![InteractionRecord::new(
            "terminal_run_command",
            "click",
            "button",
            "Run",
            Some("terminal_app"),
        )
        .with_value("nmap localhost")]);
        state.terminal_history = vec!["nmap localhost".to_string()];
        state.terminal.color_scheme = ColorScheme::Scanlines;
        state
    }

    #[test]
    fn missing_snapshot_is_not_an_error() {
        let dir = tempdir().expect("tmpdir");
        let store = SnapshotStore::new(dir.path().join("state.json"));
        assert!(!store.exists());
        assert!(store.load().expect("load").is_none());
        store.clear().expect("clear");
    }

    #[test]
    fn snapshot_round_trip_preserves_vfs_and_history() {
        let dir = tempdir().expect("tmpdir");
        let store = SnapshotStore::new(dir.path().join("nested").join("state.json"));
        let state = populated_state();

        store.save(&PersistedSnapshot::capture(&state)).expect("save");
        let loaded = store.load().expect("load").expect("snapshot");
        let replacement = loaded.into_replacement();

        assert_eq!(replacement.vfs, state.vfs);
        assert_eq!(replacement.history, state.history);
        assert_eq!(replacement.path, state.path);
        assert_eq!(replacement.terminal_history, state.terminal_history);
        assert_eq!(replacement.terminal.color_scheme, ColorScheme::Scanlines);
        assert_eq!(replacement.active_app.as_deref(), Some("terminal_app"));
    }

    #[test]
    fn clear_removes_the_file() {
        let dir = tempdir().expect("tmpdir");
        let store = SnapshotStore::new(dir.path().join("state.json"));
        store
            .save(&PersistedSnapshot::capture(&SessionState::default()))
            .expect("save");
        assert!(store.exists());
        store.clear().expect("clear");
        assert!(!store.exists());
    }

    #[test]
    fn open_panel_saves_the_covered_app() {
        let mut state = SessionState::default();
        state.parameters_open = true;
        state.previous_app = Some("notes_app".to_string());
        let snapshot = PersistedSnapshot::capture(&state);
        assert_eq!(snapshot.active_app_id.as_deref(), Some("notes_app"));
    }

    #[test]
    fn snapshot_json_uses_flat_field_names() {
        let snapshot = PersistedSnapshot::capture(&populated_state());
        let value = serde_json::to_value(&snapshot).expect("json");
        assert_eq!(value["active_app_id"], "terminal_app");
        assert_eq!(value["terminal_color_scheme"], "scanlines");
        assert_eq!(value["vfs"]["tmp"]["scan.log"], "22/tcp open");
    }
}
