//! # Store Facade
//!
//! The primitives the registry, ledger, ranking and weather layers need from the key-value
//! store, behind one object-safe trait so the service can run against Redis or in process.
//!
//! ## Implementations
//!
//! - [`RedisStore`](crate::redis_store::RedisStore): one lazily connected `ConnectionManager`
//!   shared by every request. Connect is single-flight, later calls reuse the handle.
//! - [`MemoryStore`](crate::memory::MemoryStore): same contract in process, used by tests and
//!   `--memory` runs.
//!
//! ## Atomicity
//!
//! Plain primitives are atomic per command and nothing more. Multi-step sequences that keep the
//! rating aggregate consistent are exposed as single store-side operations
//! ([`Store::append_review`], [`Store::remove_review`]) so concurrent submissions against the
//! same restaurant cannot lose an update. [`Batch`] groups independent writes into one round
//! trip.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    SAdd {
        key: String,
        member: String,
    },
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
}

/// Independent writes issued together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    ops: Vec<Op>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hset(&mut self, key: impl Into<String>, fields: Vec<(String, String)>) -> &mut Self {
        self.ops.push(Op::HSet {
            key: key.into(),
            fields,
        });
        self
    }

    pub fn sadd(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.ops.push(Op::SAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn zadd(&mut self, key: impl Into<String>, member: impl Into<String>, score: f64) -> &mut Self {
        self.ops.push(Op::ZAdd {
            key: key.into(),
            member: member.into(),
            score,
        });
        self
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Keys touched when a review is appended to or removed from a restaurant.
#[derive(Clone, Debug)]
pub struct ReviewKeys {
    pub restaurant_id: String,
    pub restaurant: String,
    pub reviews: String,
    pub review_details: String,
    pub ranking: String,
}

/// Result of folding a rating into a restaurant's aggregate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatingUpdate {
    pub review_count: u64,
    pub total_stars: f64,
    pub average: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReviewRemoval {
    /// Entries dropped from the restaurant's review list.
    pub unlinked: u64,
    /// Standalone review records deleted.
    pub deleted: u64,
    /// Present only when a recompute was requested and the review was actually removed.
    pub rating: Option<RatingUpdate>,
}

impl ReviewRemoval {
    pub const fn is_miss(&self) -> bool {
        self.unlinked == 0 && self.deleted == 0
    }
}

/// `round(total / count, 1)`, half away from zero. Zero reviews average to zero.
pub fn average_rating(total: f64, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    (total / count as f64 * 10.0).round() / 10.0
}

/// Rendering used for `avgStars` in the restaurant hash.
pub fn format_rating(value: f64) -> String {
    format!("{value:.1}")
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Release the shared connection. Later calls connect again.
    async fn close(&self) {}

    async fn exists(&self, key: &str) -> Result<bool, AppError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AppError>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, AppError>;

    async fn hincr(&self, key: &str, field: &str, delta: i64) -> Result<i64, AppError>;

    /// Members sorted by name.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, AppError>;

    /// Inclusive window, negative indices count from the tail.
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, AppError>;

    /// Members by descending score over an inclusive rank window.
    async fn zrevrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, AppError>;

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, AppError>;

    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError>;

    async fn json_get(&self, key: &str) -> Result<Option<Value>, AppError>;

    async fn json_set(&self, key: &str, document: &Value) -> Result<(), AppError>;

    async fn execute(&self, batch: &Batch) -> Result<(), AppError>;

    /// Push the review id, write its record, add `rating` to the running total, then write the
    /// new average to both the restaurant hash and the ranking, all in one atomic step.
    async fn append_review(
        &self,
        keys: &ReviewKeys,
        review_id: &str,
        rating: f64,
        record: &[(String, String)],
    ) -> Result<RatingUpdate, AppError>;

    /// Unlink the id from the list and delete the record atomically. The record is only deleted
    /// when its `restaurantId` is `keys.restaurant_id`. With `recompute`, the removed rating is
    /// also subtracted and the average rewritten.
    async fn remove_review(
        &self,
        keys: &ReviewKeys,
        review_id: &str,
        recompute: bool,
    ) -> Result<ReviewRemoval, AppError>;
}
