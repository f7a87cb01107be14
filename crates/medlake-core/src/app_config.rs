use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub channels_path: PathBuf,
    pub lake_root: PathBuf,
    pub channel_api_url: String,
    pub channel_api_token: Option<String>,
    pub collector_message_limit: usize,
    pub collector_request_timeout_secs: u64,
    pub collector_user_agent: String,
    pub detector_url: String,
    pub detector_timeout_secs: u64,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub transform_dir: PathBuf,
    pub transform_command: String,
    pub schedule: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("channels_path", &self.channels_path)
            .field("lake_root", &self.lake_root)
            .field("database_url", &"[redacted]")
            .field("channel_api_url", &self.channel_api_url)
            .field(
                "channel_api_token",
                &self.channel_api_token.as_ref().map(|_| "[redacted]"),
            )
            .field("collector_message_limit", &self.collector_message_limit)
            .field(
                "collector_request_timeout_secs",
                &self.collector_request_timeout_secs,
            )
            .field("collector_user_agent", &self.collector_user_agent)
            .field("detector_url", &self.detector_url)
            .field("detector_timeout_secs", &self.detector_timeout_secs)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("transform_dir", &self.transform_dir)
            .field("transform_command", &self.transform_command)
            .field("schedule", &self.schedule)
            .finish()
    }
}
