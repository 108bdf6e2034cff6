//! # Review Ledger
//!
//! ## Records
//!
//! - Redis list `prefix:reviews:<restaurantId>`: review ids, newest first
//! - Redis hash `prefix:review_details:<reviewId>`: id, rating, body, timestamp, restaurantId
//! - `totalStars` / `avgStars` fields on the restaurant hash, plus the ranking score
//!
//! ## Aggregate
//!
//! Submitting a review pushes the id, writes the record, adds the rating to `totalStars` and
//! rewrites `avgStars = round(totalStars / reviews, 1)` together with the ranking score, as one
//! store-side step. Two submissions racing on the same restaurant both land in the average.
//!
//! Deleting a review unlinks and deletes it atomically but leaves the aggregate alone unless
//! `recompute_on_delete` is set, so by default the average keeps counting deleted ratings.
use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    database::ReviewKeys,
    error::AppError,
    gate::require_restaurant,
    state::AppState,
    utils::{Page, validate_id},
};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Clone, Debug, Deserialize)]
pub struct NewReview {
    pub rating: u8,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub restaurant_id: String,
    pub rating: u8,
    pub body: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Review {
    fn fields(&self) -> Vec<(String, String)> {
        vec![
            ("id".to_string(), self.id.clone()),
            ("rating".to_string(), self.rating.to_string()),
            ("body".to_string(), self.body.clone()),
            ("timestamp".to_string(), self.timestamp.to_string()),
            ("restaurantId".to_string(), self.restaurant_id.clone()),
        ]
    }

    pub fn from_hash(hash: &HashMap<String, String>) -> Result<Option<Self>, AppError> {
        let Some(id) = hash.get("id") else {
            return Ok(None);
        };

        let corrupt = |field: &str| AppError::Internal(format!("corrupt review {id}: {field}"));

        Ok(Some(Self {
            id: id.clone(),
            restaurant_id: hash.get("restaurantId").cloned().unwrap_or_default(),
            rating: hash
                .get("rating")
                .and_then(|raw| raw.parse().ok())
                .ok_or_else(|| corrupt("rating"))?,
            body: hash.get("body").cloned().unwrap_or_default(),
            timestamp: hash
                .get("timestamp")
                .and_then(|raw| raw.parse().ok())
                .ok_or_else(|| corrupt("timestamp"))?,
        }))
    }
}

/// The new review plus the aggregate it produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedReview {
    #[serde(flatten)]
    pub review: Review,
    pub review_count: u64,
    pub avg_stars: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedReview {
    /// Set only when the aggregate was recomputed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_stars: Option<f64>,
}

impl NewReview {
    fn validate(&self) -> Result<(), AppError> {
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(AppError::InvalidInput(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }
        if self.body.trim().is_empty() {
            return Err(AppError::InvalidInput("review body must not be empty".to_string()));
        }
        Ok(())
    }
}

fn review_keys(state: &AppState, restaurant_id: &str, review_id: &str) -> ReviewKeys {
    ReviewKeys {
        restaurant_id: restaurant_id.to_string(),
        restaurant: state.keys.restaurant(restaurant_id),
        reviews: state.keys.reviews(restaurant_id),
        review_details: state.keys.review_details(review_id),
        ranking: state.keys.restaurants_by_rating(),
    }
}

pub async fn submit(
    state: &AppState,
    restaurant_id: &str,
    new: NewReview,
) -> Result<SubmittedReview, AppError> {
    require_restaurant(state, restaurant_id).await?;
    new.validate()?;

    let review = Review {
        id: Uuid::new_v4().simple().to_string(),
        restaurant_id: restaurant_id.to_string(),
        rating: new.rating,
        body: new.body,
        timestamp: Utc::now().timestamp_millis(),
    };

    let keys = review_keys(state, restaurant_id, &review.id);
    let update = state
        .store
        .append_review(&keys, &review.id, f64::from(review.rating), &review.fields())
        .await?;

    info!(
        "Review {} on {restaurant_id}: {} reviews, average {:.1}",
        review.id, update.review_count, update.average
    );

    Ok(SubmittedReview {
        review,
        review_count: update.review_count,
        avg_stars: update.average,
    })
}

/// Reviews on `page`, most recent first.
pub async fn list(state: &AppState, restaurant_id: &str, page: Page) -> Result<Vec<Review>, AppError> {
    require_restaurant(state, restaurant_id).await?;

    let (start, end) = page.window();
    let ids = state
        .store
        .lrange(&state.keys.reviews(restaurant_id), start, end)
        .await?;

    let mut reviews = Vec::with_capacity(ids.len());
    for id in &ids {
        let hash = state.store.hgetall(&state.keys.review_details(id)).await?;
        if let Some(review) = Review::from_hash(&hash)? {
            reviews.push(review);
        }
    }

    Ok(reviews)
}

pub async fn get(state: &AppState, review_id: &str) -> Result<Option<Review>, AppError> {
    validate_id(review_id)?;

    let hash = state
        .store
        .hgetall(&state.keys.review_details(review_id))
        .await?;
    Review::from_hash(&hash)
}

/// `ReviewNotFound` only when neither the list entry nor the record existed. A review that
/// belongs to another restaurant counts as absent and is left untouched.
pub async fn delete(
    state: &AppState,
    restaurant_id: &str,
    review_id: &str,
) -> Result<DeletedReview, AppError> {
    require_restaurant(state, restaurant_id).await?;
    validate_id(review_id)?;

    let keys = review_keys(state, restaurant_id, review_id);
    let removal = state
        .store
        .remove_review(&keys, review_id, state.config.recompute_on_delete)
        .await?;

    if removal.is_miss() {
        return Err(AppError::ReviewNotFound);
    }

    info!("Deleted review {review_id} from {restaurant_id}");

    Ok(DeletedReview {
        avg_stars: removal.rating.map(|rating| rating.average),
    })
}
