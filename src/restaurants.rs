//! # Restaurant Registry
//!
//! ## Records
//!
//! - Redis hash `prefix:restaurant:<id>`: id, name, location (`lng,lat`), viewCount,
//!   totalStars, avgStars
//! - Redis set `prefix:restaurant_cuisines:<id>`: the restaurant's cuisine names
//! - Redis set `prefix:cuisine:<name>`: reverse index of restaurant ids
//! - Redis set `prefix:cuisines`: every cuisine name ever referenced
//! - JSON document `prefix:restaurant_details:<id>`: free-form attributes, kept out of the hash
//!
//! ## Notes
//!
//! - Creation is one batch. On Redis it runs as MULTI/EXEC, elsewhere a partially applied batch
//!   is possible and leaves a restaurant without its ranking entry.
//! - Reading a restaurant always bumps `viewCount`, even when the record turns out empty.
//! - Nothing deletes restaurants, so cuisine sets are never pruned.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    database::{Batch, format_rating},
    error::AppError,
    gate::require_restaurant,
    ranking,
    state::AppState,
    utils::{Coordinates, Page, normalize_cuisines},
};

#[derive(Clone, Debug, Deserialize)]
pub struct NewRestaurant {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub cuisines: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    pub location: String,
    pub view_count: u64,
    pub total_stars: f64,
    pub avg_stars: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuisines: Option<Vec<String>>,
}

impl Restaurant {
    /// `None` for a hash that does not hold a registered restaurant.
    pub fn from_hash(hash: &HashMap<String, String>) -> Result<Option<Self>, AppError> {
        let Some(id) = hash.get("id") else {
            return Ok(None);
        };

        Ok(Some(Self {
            id: id.clone(),
            name: hash.get("name").cloned().unwrap_or_default(),
            location: hash.get("location").cloned().unwrap_or_default(),
            view_count: parse_field(hash, "viewCount")?.unwrap_or(0),
            total_stars: parse_field(hash, "totalStars")?.unwrap_or(0.0),
            avg_stars: parse_field(hash, "avgStars")?.unwrap_or(0.0),
            cuisines: None,
        }))
    }
}

fn parse_field<T: std::str::FromStr>(
    hash: &HashMap<String, String>,
    field: &str,
) -> Result<Option<T>, AppError> {
    hash.get(field)
        .map(|raw| {
            raw.parse()
                .map_err(|_| AppError::Internal(format!("corrupt restaurant field {field}: {raw}")))
        })
        .transpose()
}

impl NewRestaurant {
    fn validate(&self) -> Result<Vec<String>, AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidInput("name must not be empty".to_string()));
        }
        self.location.parse::<Coordinates>()?;
        normalize_cuisines(&self.cuisines)
    }
}

pub async fn create(state: &AppState, new: NewRestaurant) -> Result<Restaurant, AppError> {
    let cuisines = new.validate()?;

    let id = Uuid::new_v4().simple().to_string();
    let keys = &state.keys;
    let restaurant = Restaurant {
        id: id.clone(),
        name: new.name.trim().to_string(),
        location: new.location.trim().to_string(),
        view_count: 0,
        total_stars: 0.0,
        avg_stars: 0.0,
        cuisines: Some(cuisines.clone()),
    };

    let mut batch = Batch::new();
    batch.hset(
        keys.restaurant(&id),
        vec![
            ("id".to_string(), restaurant.id.clone()),
            ("name".to_string(), restaurant.name.clone()),
            ("location".to_string(), restaurant.location.clone()),
            ("viewCount".to_string(), "0".to_string()),
            ("totalStars".to_string(), "0".to_string()),
            ("avgStars".to_string(), format_rating(0.0)),
        ],
    );
    ranking::upsert(&mut batch, keys, &id, 0.0);

    for cuisine in &cuisines {
        batch
            .sadd(keys.cuisines(), cuisine.as_str())
            .sadd(keys.cuisine(cuisine), id.as_str())
            .sadd(keys.restaurant_cuisines(&id), cuisine.as_str());
    }

    state.store.execute(&batch).await?;
    info!("Added restaurant {id} ({})", restaurant.name);

    Ok(restaurant)
}

/// Count a view and return the merged record with its cuisines.
pub async fn read_one(state: &AppState, restaurant_id: &str) -> Result<Restaurant, AppError> {
    require_restaurant(state, restaurant_id).await?;

    let key = state.keys.restaurant(restaurant_id);
    let cuisines_key = state.keys.restaurant_cuisines(restaurant_id);

    let (_views, hash, cuisines) = tokio::try_join!(
        state.store.hincr(&key, "viewCount", 1),
        state.store.hgetall(&key),
        state.store.smembers(&cuisines_key),
    )?;

    let mut restaurant = Restaurant::from_hash(&hash)?.ok_or(AppError::RestaurantNotFound)?;
    restaurant.cuisines = Some(cuisines);

    Ok(restaurant)
}

/// Restaurants on `page` of the ranking, best rated first.
pub async fn read_page(state: &AppState, page: Page) -> Result<Vec<Restaurant>, AppError> {
    let ids = ranking::page_ids(state, page).await?;
    read_many(state, &ids).await
}

/// Resolve ids to records in the given order, skipping ids whose hash is gone.
pub async fn read_many(state: &AppState, ids: &[String]) -> Result<Vec<Restaurant>, AppError> {
    let hashes = fetch_hashes(state, ids).await?;

    let mut restaurants = Vec::with_capacity(hashes.len());
    for hash in &hashes {
        if let Some(restaurant) = Restaurant::from_hash(hash)? {
            restaurants.push(restaurant);
        }
    }

    Ok(restaurants)
}

async fn fetch_hashes(
    state: &AppState,
    ids: &[String],
) -> Result<Vec<HashMap<String, String>>, AppError> {
    let mut tasks = tokio::task::JoinSet::new();

    for (index, id) in ids.iter().enumerate() {
        let store = state.store.clone();
        let key = state.keys.restaurant(id);
        tasks.spawn(async move { (index, store.hgetall(&key).await) });
    }

    let mut hashes = vec![HashMap::new(); ids.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, hash) = joined.map_err(|e| AppError::Internal(e.to_string()))?;
        if let Some(slot) = hashes.get_mut(index) {
            *slot = hash?;
        }
    }

    Ok(hashes)
}

pub async fn set_details(
    state: &AppState,
    restaurant_id: &str,
    details: &Value,
) -> Result<(), AppError> {
    require_restaurant(state, restaurant_id).await?;

    if !details.is_object() {
        return Err(AppError::InvalidInput(
            "details must be a JSON object".to_string(),
        ));
    }

    state
        .store
        .json_set(&state.keys.restaurant_details(restaurant_id), details)
        .await
}

/// `None` until details have been attached.
pub async fn get_details(state: &AppState, restaurant_id: &str) -> Result<Option<Value>, AppError> {
    require_restaurant(state, restaurant_id).await?;

    state
        .store
        .json_get(&state.keys.restaurant_details(restaurant_id))
        .await
}
