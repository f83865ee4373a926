use std::env;
use std::path::PathBuf;

pub const DEFAULT_ENDPOINT: &str = "https://s3.amazonaws.com/models.huggingface.co/bert";
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Process environment knobs for the weight store.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub cache_dir: PathBuf,
    pub endpoint: String,
    pub offline: bool,
    pub timeout: u64,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            cache_dir: cache_dir(),
            endpoint: env::var("TRANSFORMERS_AUTO_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            offline: env::var("TRANSFORMERS_AUTO_OFFLINE")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false),
            timeout: env::var("TRANSFORMERS_AUTO_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

pub fn cache_dir() -> PathBuf {
    match env::var("TRANSFORMERS_AUTO_CACHE") {
        Ok(path) => expand_home(&path),
        Err(_) => dirs::cache_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("transformers-auto"),
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
