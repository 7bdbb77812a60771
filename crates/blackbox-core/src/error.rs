use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VfsError {
    #[error("not a directory: /{0}")]
    NotADirectory(String),
    #[error("no such file or directory: /{0}")]
    NotFound(String),
    #[error("the root of the file system must be a directory")]
    RootMustBeDirectory,
}

/// Failure classes of the generation path. None of these cross the stream
/// boundary as an `Err`; they ride along with the fragment that replaces the
/// generated content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("the API key is not configured")]
    Configuration,
    #[error("no interaction data provided")]
    EmptyInput,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed signal payload: {0}")]
    Decode(String),
}

/// The `Display` text of every variant is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("Please enter a number between 0 and 10 for history length.")]
    HistoryLength,
    #[error("Please enter a font size between 8 and 24.")]
    FontSize,
    #[error("Unknown terminal color scheme '{0}'. Choose default, amber, white or scanlines.")]
    ColorScheme(String),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot format: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config [session]: {0}")]
    Session(#[from] SettingsError),
}
