//! In-process [`Store`] with Redis semantics for the structures this service uses.
//!
//! Expiry is measured on the tokio clock so a paused runtime can step through a TTL.
use std::{
    cmp::Ordering,
    collections::{BTreeSet, HashMap, VecDeque},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;

use crate::{
    database::{
        Batch, Op, RatingUpdate, ReviewKeys, ReviewRemoval, Store, average_rating, format_rating,
    },
    error::AppError,
};

#[derive(Debug)]
enum Entry {
    Str(String),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
    List(VecDeque<String>),
    ZSet(HashMap<String, f64>),
    Json(Value),
}

#[derive(Debug)]
struct Slot {
    entry: Entry,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Keyspace {
    slots: HashMap<String, Slot>,
}

fn wrong_type(key: &str) -> AppError {
    AppError::Store(format!(
        "WRONGTYPE Operation against a key holding the wrong kind of value: {key}"
    ))
}

macro_rules! typed_mut {
    ($name:ident, $variant:ident, $ty:ty) => {
        fn $name(&mut self, key: &str) -> Result<&mut $ty, AppError> {
            self.purge(key);
            let slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
                entry: Entry::$variant(Default::default()),
                expires_at: None,
            });
            match &mut slot.entry {
                Entry::$variant(value) => Ok(value),
                _ => Err(wrong_type(key)),
            }
        }
    };
}

impl Keyspace {
    fn purge(&mut self, key: &str) {
        let expired = self
            .slots
            .get(key)
            .and_then(|slot| slot.expires_at)
            .is_some_and(|deadline| Instant::now() >= deadline);

        if expired {
            self.slots.remove(key);
        }
    }

    fn live(&mut self, key: &str) -> Option<&Entry> {
        self.purge(key);
        self.slots.get(key).map(|slot| &slot.entry)
    }

    typed_mut!(hash_mut, Hash, HashMap<String, String>);
    typed_mut!(set_mut, Set, BTreeSet<String>);
    typed_mut!(list_mut, List, VecDeque<String>);
    typed_mut!(zset_mut, ZSet, HashMap<String, f64>);

    fn hash(&mut self, key: &str) -> Result<Option<&HashMap<String, String>>, AppError> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry::Hash(hash)) => Ok(Some(hash)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    /// Fail with WRONGTYPE unless `key` is absent or holds what `holds` accepts.
    fn ensure(&mut self, key: &str, holds: fn(&Entry) -> bool) -> Result<(), AppError> {
        match self.live(key) {
            Some(entry) if !holds(entry) => Err(wrong_type(key)),
            _ => Ok(()),
        }
    }

    /// Type-check every key an aggregate operation writes, before anything is written.
    fn ensure_review_keys(&mut self, keys: &ReviewKeys) -> Result<(), AppError> {
        self.ensure(&keys.reviews, |entry| matches!(entry, Entry::List(_)))?;
        self.ensure(&keys.review_details, |entry| matches!(entry, Entry::Hash(_)))?;
        self.ensure(&keys.restaurant, |entry| matches!(entry, Entry::Hash(_)))?;
        self.ensure(&keys.ranking, |entry| matches!(entry, Entry::ZSet(_)))
    }

    fn list_len(&mut self, key: &str) -> Result<usize, AppError> {
        match self.live(key) {
            None => Ok(0),
            Some(Entry::List(list)) => Ok(list.len()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn hincr_float(&mut self, key: &str, field: &str, delta: f64) -> Result<f64, AppError> {
        let hash = self.hash_mut(key)?;
        let current = match hash.get(field) {
            Some(raw) => raw
                .parse::<f64>()
                .map_err(|_| AppError::Store("ERR hash value is not a float".to_string()))?,
            None => 0.0,
        };
        let total = current + delta;
        hash.insert(field.to_string(), total.to_string());
        Ok(total)
    }

    fn write_average(&mut self, keys: &ReviewKeys, average: f64) -> Result<(), AppError> {
        self.zset_mut(&keys.ranking)?
            .insert(keys.restaurant_id.clone(), average);
        self.hash_mut(&keys.restaurant)?
            .insert("avgStars".to_string(), format_rating(average));
        Ok(())
    }

    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.slots.get(key).map(|slot| &slot.entry) {
            Some(Entry::Hash(hash)) => hash.is_empty(),
            Some(Entry::Set(set)) => set.is_empty(),
            Some(Entry::List(list)) => list.is_empty(),
            Some(Entry::ZSet(zset)) => zset.is_empty(),
            _ => false,
        };

        if empty {
            self.slots.remove(key);
        }
    }
}

/// Resolve a Redis-style inclusive `[start, stop]` window over `len` items.
pub(crate) fn window(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = isize::try_from(len).ok()?;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if len == 0 || start > stop || start >= len {
        return None;
    }

    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspace: Mutex<Keyspace>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.keyspace.lock().live(key).is_some())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AppError> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace
            .hash(key)?
            .and_then(|hash| hash.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, AppError> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace.hash(key)?.cloned().unwrap_or_default())
    }

    async fn hincr(&self, key: &str, field: &str, delta: i64) -> Result<i64, AppError> {
        let mut keyspace = self.keyspace.lock();
        let hash = keyspace.hash_mut(key)?;
        let current = match hash.get(field) {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                AppError::Store("ERR hash value is not an integer".to_string())
            })?,
            None => 0,
        };
        let next = current + delta;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, AppError> {
        let mut keyspace = self.keyspace.lock();
        match keyspace.live(key) {
            None => Ok(Vec::new()),
            Some(Entry::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, AppError> {
        let mut keyspace = self.keyspace.lock();
        let list = match keyspace.live(key) {
            None => return Ok(Vec::new()),
            Some(Entry::List(list)) => list,
            Some(_) => return Err(wrong_type(key)),
        };

        Ok(match window(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn zrevrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, AppError> {
        let mut keyspace = self.keyspace.lock();
        let zset = match keyspace.live(key) {
            None => return Ok(Vec::new()),
            Some(Entry::ZSet(zset)) => zset,
            Some(_) => return Err(wrong_type(key)),
        };

        // Same order as ZREVRANGE: score descending, equal scores by member descending.
        let mut ranked: Vec<(&String, f64)> = zset.iter().map(|(m, s)| (m, *s)).collect();
        ranked.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => b.0.cmp(a.0),
            other => other,
        });

        Ok(match window(ranked.len(), start, stop) {
            Some((from, to)) => ranked[from..=to].iter().map(|(m, _)| (*m).clone()).collect(),
            None => Vec::new(),
        })
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, AppError> {
        let mut keyspace = self.keyspace.lock();
        match keyspace.live(key) {
            None => Ok(None),
            Some(Entry::ZSet(zset)) => Ok(zset.get(member).copied()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut keyspace = self.keyspace.lock();
        match keyspace.live(key) {
            None => Ok(None),
            Some(Entry::Str(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError> {
        if ttl.is_zero() {
            return Err(AppError::Store(
                "ERR invalid expire time in 'setex' command".to_string(),
            ));
        }

        self.keyspace.lock().slots.insert(
            key.to_string(),
            Slot {
                entry: Entry::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn json_get(&self, key: &str) -> Result<Option<Value>, AppError> {
        let mut keyspace = self.keyspace.lock();
        match keyspace.live(key) {
            None => Ok(None),
            Some(Entry::Json(document)) => Ok(Some(document.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn json_set(&self, key: &str, document: &Value) -> Result<(), AppError> {
        let mut keyspace = self.keyspace.lock();
        match keyspace.live(key) {
            None | Some(Entry::Json(_)) => {}
            Some(_) => return Err(wrong_type(key)),
        }

        keyspace.slots.insert(
            key.to_string(),
            Slot {
                entry: Entry::Json(document.clone()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn execute(&self, batch: &Batch) -> Result<(), AppError> {
        let mut keyspace = self.keyspace.lock();

        for op in batch.ops() {
            match op {
                Op::HSet { key, fields } => {
                    let hash = keyspace.hash_mut(key)?;
                    for (field, value) in fields {
                        hash.insert(field.clone(), value.clone());
                    }
                }
                Op::SAdd { key, member } => {
                    keyspace.set_mut(key)?.insert(member.clone());
                }
                Op::ZAdd { key, member, score } => {
                    keyspace.zset_mut(key)?.insert(member.clone(), *score);
                }
            }
        }

        Ok(())
    }

    async fn append_review(
        &self,
        keys: &ReviewKeys,
        review_id: &str,
        rating: f64,
        record: &[(String, String)],
    ) -> Result<RatingUpdate, AppError> {
        let mut keyspace = self.keyspace.lock();
        keyspace.ensure_review_keys(keys)?;

        let list = keyspace.list_mut(&keys.reviews)?;
        list.push_front(review_id.to_string());
        let review_count = list.len() as u64;

        let details = keyspace.hash_mut(&keys.review_details)?;
        for (field, value) in record {
            details.insert(field.clone(), value.clone());
        }

        let total_stars = keyspace.hincr_float(&keys.restaurant, "totalStars", rating)?;
        let average = average_rating(total_stars, review_count);
        keyspace.write_average(keys, average)?;

        Ok(RatingUpdate {
            review_count,
            total_stars,
            average,
        })
    }

    async fn remove_review(
        &self,
        keys: &ReviewKeys,
        review_id: &str,
        recompute: bool,
    ) -> Result<ReviewRemoval, AppError> {
        let mut keyspace = self.keyspace.lock();
        keyspace.ensure_review_keys(keys)?;

        let list = keyspace.list_mut(&keys.reviews)?;
        let before = list.len();
        list.retain(|id| id != review_id);
        let unlinked = (before - list.len()) as u64;
        keyspace.drop_if_empty(&keys.reviews);

        // Records owned by another restaurant stay put.
        let owned = keyspace.hash(&keys.review_details)?.and_then(|record| {
            (record.get("restaurantId") == Some(&keys.restaurant_id))
                .then(|| record.get("rating").cloned())
        });
        let (rating, deleted) = match owned {
            Some(rating) => {
                keyspace.slots.remove(&keys.review_details);
                (rating, 1)
            }
            None => (None, 0),
        };

        let mut removal = ReviewRemoval {
            unlinked,
            deleted,
            rating: None,
        };

        if !recompute || unlinked == 0 || deleted == 0 {
            return Ok(removal);
        }

        let Some(rating) = rating.and_then(|raw| raw.parse::<f64>().ok()) else {
            return Ok(removal);
        };

        let total_stars = keyspace.hincr_float(&keys.restaurant, "totalStars", -rating)?;
        let review_count = keyspace.list_len(&keys.reviews)? as u64;
        let average = average_rating(total_stars, review_count);
        keyspace.write_average(keys, average)?;

        removal.rating = Some(RatingUpdate {
            review_count,
            total_stars,
            average,
        });
        Ok(removal)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{MemoryStore, window};
    use crate::database::{Batch, ReviewKeys, Store};

    fn review_keys() -> ReviewKeys {
        ReviewKeys {
            restaurant_id: "R1".to_string(),
            restaurant: "t:restaurant:R1".to_string(),
            reviews: "t:reviews:R1".to_string(),
            review_details: "t:review_details:V1".to_string(),
            ranking: "t:restaurants_by_rating".to_string(),
        }
    }

    fn record(rating: &str) -> Vec<(String, String)> {
        vec![
            ("rating".to_string(), rating.to_string()),
            ("restaurantId".to_string(), "R1".to_string()),
        ]
    }

    #[test]
    fn test_window() {
        assert_eq!(window(5, 0, 1), Some((0, 1)));
        assert_eq!(window(5, 3, 10), Some((3, 4)));
        assert_eq!(window(5, 0, -1), Some((0, 4)));
        assert_eq!(window(5, -2, -1), Some((3, 4)));
        assert_eq!(window(5, 5, 9), None);
        assert_eq!(window(5, 3, 2), None);
        assert_eq!(window(0, 0, -1), None);
    }

    #[tokio::test]
    async fn test_hash_roundtrip_and_increment() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        batch.hset(
            "h",
            vec![("name".to_string(), "Pasta Place".to_string())],
        );
        store.execute(&batch).await.unwrap();

        assert_eq!(store.hincr("h", "viewCount", 1).await.unwrap(), 1);
        assert_eq!(store.hincr("h", "viewCount", 1).await.unwrap(), 2);
        assert_eq!(
            store.hget("h", "name").await.unwrap().as_deref(),
            Some("Pasta Place")
        );
        assert_eq!(store.hgetall("h").await.unwrap().len(), 2);
        assert!(store.hgetall("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type_is_rejected() {
        let store = MemoryStore::new();
        store
            .set_ex("s", "value", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(store.hgetall("s").await.is_err());
        assert!(store.hincr("s", "f", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_zrevrange_orders_by_score_then_member() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        batch
            .zadd("z", "a", 1.0)
            .zadd("z", "b", 3.0)
            .zadd("z", "c", 3.0)
            .zadd("z", "d", 2.0);
        store.execute(&batch).await.unwrap();

        assert_eq!(
            store.zrevrange("z", 0, -1).await.unwrap(),
            vec!["c", "b", "d", "a"]
        );
        assert_eq!(store.zrevrange("z", 1, 2).await.unwrap(), vec!["b", "d"]);
        assert_eq!(store.zscore("z", "d").await.unwrap(), Some(2.0));
        assert_eq!(store.zscore("z", "x").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_string_expires_after_ttl() {
        let store = MemoryStore::new();
        store
            .set_ex("w", "{}", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.get("w").await.unwrap().as_deref(), Some("{}"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("w").await.unwrap(), None);
        assert!(!store.exists("w").await.unwrap());
    }

    #[tokio::test]
    async fn test_append_review_updates_aggregate() {
        let store = MemoryStore::new();
        let keys = review_keys();

        let first = store
            .append_review(&keys, "V1", 4.0, &record("4"))
            .await
            .unwrap();
        assert_eq!(first.review_count, 1);
        assert_eq!(first.average, 4.0);

        let mut second_keys = keys.clone();
        second_keys.review_details = "t:review_details:V2".to_string();
        let second = store
            .append_review(&second_keys, "V2", 2.0, &record("2"))
            .await
            .unwrap();
        assert_eq!(second.review_count, 2);
        assert_eq!(second.total_stars, 6.0);
        assert_eq!(second.average, 3.0);

        assert_eq!(
            store.lrange(&keys.reviews, 0, -1).await.unwrap(),
            vec!["V2", "V1"]
        );
        assert_eq!(store.zscore(&keys.ranking, "R1").await.unwrap(), Some(3.0));
        assert_eq!(
            store.hget(&keys.restaurant, "avgStars").await.unwrap().as_deref(),
            Some("3.0")
        );
    }

    #[tokio::test]
    async fn test_remove_review_reports_both_sides() {
        let store = MemoryStore::new();
        let keys = review_keys();
        store
            .append_review(&keys, "V1", 5.0, &record("5"))
            .await
            .unwrap();

        let removal = store.remove_review(&keys, "V1", false).await.unwrap();
        assert_eq!(removal.unlinked, 1);
        assert_eq!(removal.deleted, 1);
        assert!(removal.rating.is_none());
        assert_eq!(store.zscore(&keys.ranking, "R1").await.unwrap(), Some(5.0));

        let again = store.remove_review(&keys, "V1", false).await.unwrap();
        assert!(again.is_miss());
    }

    #[tokio::test]
    async fn test_remove_review_with_recompute() {
        let store = MemoryStore::new();
        let keys = review_keys();
        store
            .append_review(&keys, "V1", 4.0, &record("4"))
            .await
            .unwrap();

        let mut second_keys = keys.clone();
        second_keys.review_details = "t:review_details:V2".to_string();
        store
            .append_review(&second_keys, "V2", 2.0, &record("2"))
            .await
            .unwrap();

        let removal = store.remove_review(&keys, "V1", true).await.unwrap();
        let rating = removal.rating.unwrap();
        assert_eq!(rating.review_count, 1);
        assert_eq!(rating.average, 2.0);
        assert_eq!(store.zscore(&keys.ranking, "R1").await.unwrap(), Some(2.0));

        let last = store.remove_review(&second_keys, "V2", true).await.unwrap();
        assert_eq!(last.rating.unwrap().average, 0.0);
    }

    #[tokio::test]
    async fn test_append_review_writes_nothing_on_wrong_type() {
        let store = MemoryStore::new();
        let keys = review_keys();
        store
            .set_ex(&keys.restaurant, "not a hash", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.append_review(&keys, "V1", 4.0, &record("4")).await.is_err());
        assert!(store.lrange(&keys.reviews, 0, -1).await.unwrap().is_empty());
        assert!(store.hgetall(&keys.review_details).await.unwrap().is_empty());
        assert_eq!(store.zscore(&keys.ranking, "R1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_review_keeps_foreign_record() {
        let store = MemoryStore::new();
        let owner = review_keys();
        store
            .append_review(&owner, "V1", 4.0, &record("4"))
            .await
            .unwrap();

        let mut other = owner.clone();
        other.restaurant_id = "R2".to_string();
        other.restaurant = "t:restaurant:R2".to_string();
        other.reviews = "t:reviews:R2".to_string();

        let removal = store.remove_review(&other, "V1", true).await.unwrap();
        assert!(removal.is_miss());
        assert!(removal.rating.is_none());
        assert_eq!(store.lrange(&owner.reviews, 0, -1).await.unwrap(), vec!["V1"]);
        assert_eq!(
            store.hget(&owner.review_details, "rating").await.unwrap().as_deref(),
            Some("4")
        );
    }
}
