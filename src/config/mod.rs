pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ENV_PREFIX, get_config_path, load_config};
pub use schema::Config;
