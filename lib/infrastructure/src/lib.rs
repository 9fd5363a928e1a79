mod bus;
mod http;
mod monitoring;

pub use bus::{EventBus, EventEmitter, EventListener};

pub use monitoring::{EnvFilterConfig, LogLevelHandle, MonitoringConfig};

pub use http::server::HttpServerConfig;
