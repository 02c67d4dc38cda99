use save_keeper::Config;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// TOML file for the store; built-in defaults when unset
    pub keeper_config: Option<PathBuf>,
    pub log_level: String,
    pub cors_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3030),
            keeper_config: std::env::var_os("KEEPER_CONFIG").map(PathBuf::from),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|v| !v.is_empty()),
        }
    }

    pub fn keeper(&self) -> save_keeper::Result<Config> {
        match &self.keeper_config {
            Some(path) => Config::from_file(path),
            None => Ok(Config::default()),
        }
    }
}
