pub mod ai;
pub mod config;
pub mod controller;
pub mod error;
pub mod flush;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use ai::{CompletionClient, GeminiClient};
pub use config::Config;
pub use controller::{
    ControllerOptions, ConversationController, ConversationSnapshot, TurnOutcome, TurnState,
};
pub use error::{Error, Result};
pub use state::{Message, Sender};
pub use store::{ConversationStore, JsonFileStore};
