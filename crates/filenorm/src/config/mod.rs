pub mod loader;
pub mod schema;

pub use loader::{apply_env_overrides, load_settings, load_settings_from_str, ENV_PREFIX};
pub use schema::{LoggingConfig, Settings, MAX_RETRY_DELAY};
