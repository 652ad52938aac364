//! Core types, config, errors, client protocol, and storage interfaces for Easel.

pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod store;
pub mod types;

pub use error::{EaselError, Result};
pub use protocol::ClientEvent;
pub use types::{ConversationMessage, MessageContent, Role, ToolCallFragment, ToolCallRef};
