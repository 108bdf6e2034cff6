//! # Weather
//!
//! Proxy in front of an upstream current-weather lookup, cached per restaurant.
//!
//! ## Cache
//!
//! - Redis string under `prefix:weather:<restaurantId>` holding the upstream JSON verbatim
//! - Written on a miss with a fixed TTL (one hour by default), never revalidated early
//! - Expiry is left to the store, nothing deletes entries explicitly
//!
//! A hit never touches the upstream service or the restaurant's coordinates.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

use crate::{error::AppError, gate::require_restaurant, state::AppState, utils::Coordinates};

#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self, coordinates: Coordinates) -> Result<Value, AppError>;
}

/// OpenWeather current conditions in imperial units.
pub struct OpenWeather {
    client: Client,
    url: String,
    api_key: String,
}

impl OpenWeather {
    pub fn new(url: &str, api_key: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("weather client: {e}")))?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl WeatherSource for OpenWeather {
    async fn current(&self, coordinates: Coordinates) -> Result<Value, AppError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("units", "imperial".to_string()),
                ("lat", coordinates.lat.to_string()),
                ("lon", coordinates.lng.to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| AppError::WeatherFetch(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(AppError::WeatherFetch(format!(
                "upstream answered {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::WeatherFetch(format!("unreadable upstream body: {e}")))
    }
}

pub async fn current_weather(state: &AppState, restaurant_id: &str) -> Result<Value, AppError> {
    require_restaurant(state, restaurant_id).await?;

    let weather_key = state.keys.weather(restaurant_id);
    if let Some(cached) = state.store.get(&weather_key).await? {
        debug!("Weather cache hit for {restaurant_id}");
        return Ok(serde_json::from_str(&cached)?);
    }

    debug!("Weather cache miss for {restaurant_id}");

    let location = state
        .store
        .hget(&state.keys.restaurant(restaurant_id), "location")
        .await?
        .ok_or(AppError::CoordinatesNotFound)?;
    let coordinates: Coordinates = location
        .parse()
        .map_err(|_| AppError::CoordinatesNotFound)?;

    let payload = state.weather.current(coordinates).await?;

    #[cfg(feature = "verbose")]
    info!("Upstream weather payload: {payload}");

    state
        .store
        .set_ex(&weather_key, &payload.to_string(), state.config.weather_ttl)
        .await?;
    info!(
        "Cached weather for {restaurant_id} for {}s",
        state.config.weather_ttl.as_secs()
    );

    Ok(payload)
}
