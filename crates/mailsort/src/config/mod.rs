pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load_config, load_config_from_str, normalize_extensions};
pub use schema::{
    Config, ImapConfig, LogFormat, LoggingConfig, ProcessingConfig, RoutingRule, SmtpConfig,
};
