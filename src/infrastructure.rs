//! Infrastructure layer: configuration, logging and the network adapters
//! (REST backend and WebSocket push channel).

pub mod api_client;
pub mod config;
pub mod logging;
pub mod push_channel;

pub use api_client::{ApiClient, ApiError, SearchHit, SearchMethod};
pub use config::{AppConfig, ConfigError, ConfigManager, LoggingConfig};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use push_channel::WebSocketTransport;
