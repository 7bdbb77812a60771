use super::actions::SettingsUpdate;
use super::actions::TerminalUpdate;
use super::error::SettingsError;
use super::state::check_font_size;
use super::state::check_history_length;
use super::state::ColorScheme;
use super::state::SessionState;

/// Editable copy of the parameters panel. Numbers stay as typed until
/// `validate`, which accepts all fields or none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDraft {
    pub max_history_length: String,
    pub statefulness: bool,
    pub quiet_mode: bool,
    pub color_scheme: String,
    pub font_size: String,
}

impl SettingsDraft {
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            max_history_length: state.settings.max_history_length.to_string(),
            statefulness: state.settings.statefulness,
            quiet_mode: state.settings.quiet_mode,
            color_scheme: state.terminal.color_scheme.label().to_string(),
            font_size: state.terminal.font_size.to_string(),
        }
    }

    /// Sets a field by its panel name. Returns false for unknown fields or
    /// unparsable booleans.
    pub fn set(&mut self, field: &str, value: &str) -> bool {
        let value = value.trim();
        match field {
            "history" | "max_history_length" => self.max_history_length = value.to_string(),
            "statefulness" => match parse_flag(value) {
                Some(flag) => self.statefulness = flag,
                None => return false,
            },
            "quiet" | "quiet_mode" => match parse_flag(value) {
                Some(flag) => self.quiet_mode = flag,
                None => return false,
            },
            "color" | "color_scheme" => self.color_scheme = value.to_string(),
            "font" | "font_size" => self.font_size = value.to_string(),
            _ => return false,
        }
        true
    }

    pub fn validate(&self) -> Result<(SettingsUpdate, TerminalUpdate), SettingsError> {
        let max_history_length = self
            .max_history_length
            .trim()
            .parse::<usize>()
            .map_err(|_| SettingsError::HistoryLength)
            .and_then(check_history_length)?;
        let font_size = self
            .font_size
            .trim()
            .parse::<u8>()
            .map_err(|_| SettingsError::FontSize)
            .and_then(check_font_size)?;
        let color_scheme = ColorScheme::parse(&self.color_scheme)
            .ok_or_else(|| SettingsError::ColorScheme(self.color_scheme.clone()))?;

        Ok((
            SettingsUpdate {
                max_history_length: Some(max_history_length),
                statefulness: Some(self.statefulness),
                quiet_mode: Some(self.quiet_mode),
            },
            TerminalUpdate {
                color_scheme: Some(color_scheme),
                font_size: Some(font_size),
            },
        ))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
