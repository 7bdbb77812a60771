pub mod actions;
pub mod apps;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod interaction;
pub mod persistence;
pub mod prompt;
pub mod reducer;
pub mod session;
pub mod settings;
pub mod state;
pub mod vfs;

pub use actions::*;
pub use reducer::*;
pub use state::*;

pub use config::Config;
pub use error::*;
pub use generation::*;
pub use interaction::InteractionHistory;
pub use interaction::InteractionRecord;
pub use persistence::*;
pub use session::*;
pub use vfs::Vfs;
pub use vfs::VfsNode;
