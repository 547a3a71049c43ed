//! Process configuration from environment variables.

use std::path::PathBuf;

use eventline_infra::bootstrap::AdminSeed;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_RATE_LIMIT_PER_MINUTE: u64 = 600;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Root of the hierarchical event store.
    pub data_dir: PathBuf,
    /// Root of the topic config files.
    pub config_dir: PathBuf,
    /// Consumer records; kept under the data root, outside any topic name.
    pub consumers_dir: PathBuf,
    pub max_body_bytes: usize,
    pub rate_limit_per_minute: u64,
    pub admin: Option<AdminSeed>,
}

impl AppConfig {
    /// Read `PORT`, `DATA_DIR`, `CONFIG_DIR`, `MAX_BODY_BYTES`,
    /// `RATE_LIMIT_PER_MINUTE`, `SYSTEM_ADMIN_EMAIL`,
    /// `SYSTEM_ADMIN_PASSWORD`. Every variable has a workable default except
    /// the admin pair, which is simply skipped when absent.
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(env_or("DATA_DIR", "data/events"));
        let consumers_dir = data_dir.join("_consumers");
        Self {
            port: parse_or("PORT", DEFAULT_PORT),
            config_dir: PathBuf::from(env_or("CONFIG_DIR", "data/topics")),
            consumers_dir,
            data_dir,
            max_body_bytes: parse_or("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES),
            rate_limit_per_minute: parse_or("RATE_LIMIT_PER_MINUTE", DEFAULT_RATE_LIMIT_PER_MINUTE),
            admin: AdminSeed::from_env(),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
