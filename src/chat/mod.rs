pub mod types;

pub use types::{ChatMessage, MessageMetadata, MessagePatch, MessageSource, Role};
