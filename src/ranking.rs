//! Global ranking of restaurants by average rating.
//!
//! A single sorted set scored by the current average. Every restaurant enters with score 0 at
//! creation and is rescored by the review ledger whenever its average changes. Equal scores fall
//! back to the store's own ordering (member name, descending).
use crate::{
    database::Batch,
    error::AppError,
    keys::KeySpace,
    state::AppState,
    utils::Page,
};

/// Queue an insert-or-update of a restaurant's score.
pub fn upsert(batch: &mut Batch, keys: &KeySpace, restaurant_id: &str, score: f64) {
    batch.zadd(keys.restaurants_by_rating(), restaurant_id, score);
}

/// Restaurant ids on `page`, best rated first.
pub async fn page_ids(state: &AppState, page: Page) -> Result<Vec<String>, AppError> {
    let (start, end) = page.window();
    state
        .store
        .zrevrange(&state.keys.restaurants_by_rating(), start, end)
        .await
}

pub async fn score(state: &AppState, restaurant_id: &str) -> Result<Option<f64>, AppError> {
    state
        .store
        .zscore(&state.keys.restaurants_by_rating(), restaurant_id)
        .await
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::{page_ids, score, upsert};
    use crate::{
        config::Config,
        database::{Batch, Store},
        memory::MemoryStore,
        state::AppState,
        utils::Page,
        weather::tests::StaticWeather,
    };

    async fn ranked(count: usize) -> Arc<AppState> {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::from_parts(
            Config::default(),
            store.clone(),
            Arc::new(StaticWeather::default()),
        );

        let mut batch = Batch::new();
        for i in 0..count {
            upsert(&mut batch, &state.keys, &format!("R{i:02}"), (i % 5) as f64);
        }
        store.execute(&batch).await.unwrap();
        state
    }

    #[tokio::test]
    async fn test_pages_cover_every_restaurant_once() {
        let total = 23;
        let limit = 5;
        let state = ranked(total).await;

        let mut seen = Vec::new();
        let mut pages = 0;
        for page in 1.. {
            let ids = page_ids(&state, Page::new(page, limit).unwrap()).await.unwrap();
            if ids.is_empty() {
                break;
            }
            assert!(ids.len() <= limit as usize);
            pages += 1;
            seen.extend(ids);
        }

        assert_eq!(pages, total.div_ceil(limit as usize));
        assert_eq!(seen.len(), total);
        assert_eq!(seen.iter().collect::<HashSet<_>>().len(), total);
    }

    #[tokio::test]
    async fn test_descending_score_order() {
        let state = ranked(10).await;
        let ids = page_ids(&state, Page::new(1, 10).unwrap()).await.unwrap();

        let mut scores = Vec::new();
        for id in &ids {
            scores.push(score(&state, id).await.unwrap().unwrap());
        }
        assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(scores.first(), Some(&4.0));
    }

    #[tokio::test]
    async fn test_upsert_rescores() {
        let state = ranked(3).await;

        let mut batch = Batch::new();
        upsert(&mut batch, &state.keys, "R00", 9.0);
        state.store.execute(&batch).await.unwrap();

        assert_eq!(score(&state, "R00").await.unwrap(), Some(9.0));
        let top = page_ids(&state, Page::new(1, 1).unwrap()).await.unwrap();
        assert_eq!(top, vec!["R00"]);
    }
}
