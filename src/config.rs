use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::error::AppError;

pub const DEFAULT_PREFIX: &str = "bites";
pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub key_prefix: String,
    pub weather_url: String,
    pub weather_api_key: String,
    pub weather_ttl: Duration,
    /// Subtract a deleted review's rating and recompute the average. Off by default: deletes
    /// leave the aggregate untouched.
    pub recompute_on_delete: bool,
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        Ok(Self {
            port: try_load("PORT", "3000")?,
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379")?,
            key_prefix: try_load("KEY_PREFIX", DEFAULT_PREFIX)?,
            weather_url: try_load("WEATHER_URL", DEFAULT_WEATHER_URL)?,
            weather_api_key: read_secret("WEATHER_API_KEY")
                .or_else(|| var("WEATHER_API_KEY").ok())
                .unwrap_or_default(),
            weather_ttl: weather_ttl(try_load("WEATHER_TTL_SECS", "3600")?)?,
            recompute_on_delete: try_load("RECOMPUTE_ON_DELETE", "false")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: DEFAULT_PREFIX.to_string(),
            weather_url: DEFAULT_WEATHER_URL.to_string(),
            weather_api_key: String::new(),
            weather_ttl: Duration::from_secs(60 * 60),
            recompute_on_delete: false,
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, AppError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| AppError::Config(format!("invalid {key} value: {e}")))
}

/// The cache window is at least one second; SETEX refuses zero.
fn weather_ttl(secs: u64) -> Result<Duration, AppError> {
    if secs == 0 {
        return Err(AppError::Config(
            "invalid WEATHER_TTL_SECS value: must be at least 1".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            info!("No {secret_name} secret file ({e}), falling back to environment");
        })
        .ok()
}
