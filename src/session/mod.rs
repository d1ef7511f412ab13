pub mod store;
pub mod types;

pub use store::SessionStore;
pub use types::{ESTIMATED_SESSION_BYTES, Session, SessionPatch, SessionStats, SessionStoreConfig};
