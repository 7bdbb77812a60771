use super::interaction::FILE_EXPLORER_APP;
use super::interaction::TERMINAL_APP;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
}

pub const APP_CATALOG: [AppDefinition; 9] = [
    AppDefinition {
        id: "my_computer",
        name: "Desktop",
        icon: "💻",
        color: "#2d3748",
    },
    AppDefinition {
        id: "documents",
        name: "Documents",
        icon: "📁",
        color: "#b7791f",
    },
    AppDefinition {
        id: "notes_app",
        name: "Notepad",
        icon: "📝",
        color: "#d69e2e",
    },
    AppDefinition {
        id: "settings_app",
        name: "Settings",
        icon: "⚙️",
        color: "#4a5568",
    },
    AppDefinition {
        id: "web_browser_app",
        name: "Web",
        icon: "🌐",
        color: "#3182ce",
    },
    AppDefinition {
        id: "terminal_app",
        name: "Terminal",
        icon: "⌨️",
        color: "#1a202c",
    },
    AppDefinition {
        id: "file_explorer_app",
        name: "File System",
        icon: "🗂️",
        color: "#2f855a",
    },
    AppDefinition {
        id: "gaming_app",
        name: "Games",
        icon: "🎮",
        color: "#805ad5",
    },
    AppDefinition {
        id: "trash_bin",
        name: "Trash Bin",
        icon: "🗑️",
        color: "#718096",
    },
];

pub fn find_app(id: &str) -> Option<&'static AppDefinition> {
    APP_CATALOG.iter().find(|app| app.id == id)
}

/// Name used in prompts; falls back to the raw id for apps outside the
/// catalog.
pub fn app_display_name(app_context: Option<&str>) -> Option<&str> {
    app_context.map(|id| find_app(id).map_or(id, |app| app.name))
}

/// Terminal and file explorer start in the simulated home directory; every
/// other app gets a single segment equal to its id.
pub fn initial_path_for(app_id: &str) -> Vec<String> {
    match app_id {
        TERMINAL_APP => vec!["home".to_string(), "user".to_string()],
        FILE_EXPLORER_APP => vec!["home".to_string()],
        other => vec![other.to_string()],
    }
}
