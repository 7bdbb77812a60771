use serde::Deserialize;
use serde::Serialize;

use super::error::SettingsError;
use super::interaction::InteractionHistory;
use super::interaction::MAX_HISTORY_BOUND;
use super::vfs::Vfs;

pub const DEFAULT_MAX_HISTORY_LENGTH: usize = 3;
pub const DEFAULT_TERMINAL_FONT_SIZE: u8 = 14;
pub const MIN_TERMINAL_FONT_SIZE: u8 = 8;
pub const MAX_TERMINAL_FONT_SIZE: u8 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Desktop,
    App,
    Parameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorScheme {
    #[default]
    Default,
    Amber,
    White,
    Scanlines,
}

impl ColorScheme {
    pub const ALL: [ColorScheme; 4] = [Self::Default, Self::Amber, Self::White, Self::Scanlines];

    pub fn label(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Amber => "amber",
            Self::White => "white",
            Self::Scanlines => "scanlines",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|scheme| scheme.label().eq_ignore_ascii_case(value.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalAppearance {
    pub color_scheme: ColorScheme,
    pub font_size: u8,
}

impl TerminalAppearance {
    pub fn check(&self) -> Result<(), SettingsError> {
        check_font_size(self.font_size).map(|_| ())
    }
}

impl Default for TerminalAppearance {
    fn default() -> Self {
        Self {
            color_scheme: ColorScheme::Default,
            font_size: DEFAULT_TERMINAL_FONT_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub max_history_length: usize,
    pub statefulness: bool,
    pub quiet_mode: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_history_length: DEFAULT_MAX_HISTORY_LENGTH,
            statefulness: false,
            quiet_mode: false,
        }
    }
}

impl SessionSettings {
    pub fn check(&self) -> Result<(), SettingsError> {
        check_history_length(self.max_history_length).map(|_| ())
    }
}

pub fn check_history_length(bound: usize) -> Result<usize, SettingsError> {
    if bound <= MAX_HISTORY_BOUND {
        Ok(bound)
    } else {
        Err(SettingsError::HistoryLength)
    }
}

pub fn check_font_size(size: u8) -> Result<u8, SettingsError> {
    if (MIN_TERMINAL_FONT_SIZE..=MAX_TERMINAL_FONT_SIZE).contains(&size) {
        Ok(size)
    } else {
        Err(SettingsError::FontSize)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub active_app: Option<String>,
    pub previous_app: Option<String>,
    pub parameters_open: bool,
    pub content: String,
    pub loading: bool,
    pub error: Option<String>,
    pub history: InteractionHistory,
    pub vfs: Vfs,
    pub path: Vec<String>,
    pub terminal_history: Vec<String>,
    pub settings: SessionSettings,
    pub terminal: TerminalAppearance,
    pub notepad_baseline: Option<String>,
    pub turn: u64,
    pub content_rev: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(SessionSettings::default(), TerminalAppearance::default())
    }
}

impl SessionState {
    pub fn new(settings: SessionSettings, terminal: TerminalAppearance) -> Self {
        Self {
            active_app: None,
            previous_app: None,
            parameters_open: false,
            content: String::new(),
            loading: false,
            error: None,
            history: InteractionHistory::new(),
            vfs: Vfs::seed(),
            path: Vec::new(),
            terminal_history: Vec::new(),
            settings,
            terminal,
            notepad_baseline: None,
            turn: 0,
            content_rev: 0,
        }
    }

    pub fn mode(&self) -> ViewMode {
        if self.parameters_open {
            ViewMode::Parameters
        } else if self.active_app.is_some() {
            ViewMode::App
        } else {
            ViewMode::Desktop
        }
    }

    pub fn active_app(&self) -> Option<&str> {
        self.active_app.as_deref()
    }

    pub fn is_active(&self, app_id: &str) -> bool {
        self.active_app() == Some(app_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_scheme_parsing_is_closed() {
        assert_eq!(ColorScheme::parse("Amber"), Some(ColorScheme::Amber));
        assert_eq!(ColorScheme::parse(" scanlines "), Some(ColorScheme::Scanlines));
        assert_eq!(ColorScheme::parse("green"), None);
    }

    #[test]
    fn fresh_state_is_on_the_desktop() {
        let state = SessionState::default();
        assert_eq!(state.mode(), ViewMode::Desktop);
        assert!(!state.vfs.is_empty());
        assert_eq!(state.settings.max_history_length, DEFAULT_MAX_HISTORY_LENGTH);
    }

    #[test]
    fn range_checks_match_the_panel_limits() {
        assert_eq!(check_history_length(0), Ok(0));
        assert_eq!(check_history_length(10), Ok(10));
        assert_eq!(check_history_length(11), Err(SettingsError::HistoryLength));
        assert_eq!(check_font_size(8), Ok(8));
        assert_eq!(check_font_size(25), Err(SettingsError::FontSize));
        assert!(SessionSettings {
            max_history_length: 50,
            ..SessionSettings::default()
        }
        .check()
        .is_err());
        assert!(TerminalAppearance::default().check().is_ok());
    }
}
