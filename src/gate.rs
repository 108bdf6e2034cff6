//! Existence gate run in front of every restaurant-scoped operation.
//!
//! The check and the guarded operation are separate round trips, so it is a fast 404 for
//! clients rather than a correctness guarantee. Anything that must not act on a vanished
//! restaurant has to rely on the store's own atomic operations.
use crate::{error::AppError, state::AppState, utils::validate_id};

pub async fn restaurant_exists(state: &AppState, restaurant_id: &str) -> Result<bool, AppError> {
    state
        .store
        .exists(&state.keys.restaurant(restaurant_id))
        .await
}

/// `MissingId` for an empty id, `InvalidInput` for a malformed one, `RestaurantNotFound` when
/// nothing is stored under it.
pub async fn require_restaurant(state: &AppState, restaurant_id: &str) -> Result<(), AppError> {
    validate_id(restaurant_id)?;

    if !restaurant_exists(state, restaurant_id).await? {
        return Err(AppError::RestaurantNotFound);
    }

    Ok(())
}
