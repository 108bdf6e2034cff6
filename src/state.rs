use std::sync::Arc;

use tracing::info;

use crate::{
    config::Config, database::Store, error::AppError, keys::KeySpace, memory::MemoryStore,
    redis_store::RedisStore, weather::{OpenWeather, WeatherSource},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Redis,
    Memory,
}

pub struct AppState {
    pub config: Config,
    pub keys: KeySpace,
    pub store: Arc<dyn Store>,
    pub weather: Arc<dyn WeatherSource>,
}

impl AppState {
    /// Build the shared state and, for Redis, connect before serving so a bad store address
    /// stops the process at startup.
    pub async fn new(config: Config, backend: Backend) -> Result<Arc<Self>, AppError> {
        let store: Arc<dyn Store> = match backend {
            Backend::Redis => {
                let redis = RedisStore::open(&config.redis_url)?;
                redis.connect().await?;
                Arc::new(redis)
            }
            Backend::Memory => {
                info!("Using in-process store, data will not survive a restart");
                Arc::new(MemoryStore::new())
            }
        };

        let weather = Arc::new(OpenWeather::new(&config.weather_url, &config.weather_api_key)?);

        Ok(Self::from_parts(config, store, weather))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn Store>,
        weather: Arc<dyn WeatherSource>,
    ) -> Arc<Self> {
        Arc::new(Self {
            keys: KeySpace::new(config.key_prefix.clone()),
            config,
            store,
            weather,
        })
    }
}
