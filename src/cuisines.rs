use crate::{
    error::AppError,
    restaurants::{Restaurant, read_many},
    state::AppState,
    utils::normalize_cuisines,
};

/// Every cuisine any restaurant has referenced, by name.
pub async fn list(state: &AppState) -> Result<Vec<String>, AppError> {
    state.store.smembers(&state.keys.cuisines()).await
}

/// Restaurants serving `cuisine`. An unknown cuisine is an empty list, not an error.
pub async fn restaurants(state: &AppState, cuisine: &str) -> Result<Vec<Restaurant>, AppError> {
    let names = normalize_cuisines(&[cuisine.to_string()])?;
    let Some(name) = names.first() else {
        return Ok(Vec::new());
    };

    let ids = state.store.smembers(&state.keys.cuisine(name)).await?;
    read_many(state, &ids).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{list, restaurants};
    use crate::{
        config::Config,
        error::AppError,
        memory::MemoryStore,
        restaurants::{NewRestaurant, create},
        state::AppState,
        weather::tests::StaticWeather,
    };

    #[tokio::test]
    async fn test_cuisine_index() {
        let state = AppState::from_parts(
            Config::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(StaticWeather::default()),
        );

        let pasta = create(
            &state,
            NewRestaurant {
                name: "Pasta Place".to_string(),
                location: "-73.0,40.0".to_string(),
                cuisines: vec!["Italian".to_string()],
            },
        )
        .await
        .unwrap();
        create(
            &state,
            NewRestaurant {
                name: "Noodle Bar".to_string(),
                location: "100.5,13.75".to_string(),
                cuisines: vec!["Thai".to_string(), "Vegan".to_string()],
            },
        )
        .await
        .unwrap();

        assert_eq!(list(&state).await.unwrap(), vec!["Italian", "Thai", "Vegan"]);

        let italian = restaurants(&state, " Italian ").await.unwrap();
        assert_eq!(italian.len(), 1);
        assert_eq!(italian[0].id, pasta.id);

        assert!(restaurants(&state, "Ethiopian").await.unwrap().is_empty());
        assert!(matches!(
            restaurants(&state, "  ").await,
            Err(AppError::InvalidInput(_))
        ));
    }
}
