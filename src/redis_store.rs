//! # Redis
//!
//! RAM database backing every entity.
//!
//! One `ConnectionManager` is shared by all requests. It is created on first use while holding
//! the slot lock, so concurrent first callers wait on the same connect instead of racing to open
//! their own. A failed connect leaves the slot empty and the error goes back to the caller.
//! [`Store::close`] empties the slot again on shutdown.
//!
//! The rating aggregate is maintained by Lua scripts: Redis runs a script without interleaving
//! other commands, which closes the lost-update window between "add to total" and "write the
//! average".
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    database::{Batch, Op, RatingUpdate, ReviewKeys, ReviewRemoval, Store},
    error::AppError,
};

/// KEYS: review list, review record, restaurant hash, ranking.
/// ARGV: review id, rating, restaurant id, then record field/value pairs.
const APPEND_REVIEW: &str = r"
local count = redis.call('LPUSH', KEYS[1], ARGV[1])
redis.call('HSET', KEYS[2], unpack(ARGV, 4))
local total = tonumber(redis.call('HINCRBYFLOAT', KEYS[3], 'totalStars', ARGV[2]))
local average = string.format('%.1f', math.floor(total / count * 10 + 0.5) / 10)
redis.call('ZADD', KEYS[4], average, ARGV[3])
redis.call('HSET', KEYS[3], 'avgStars', average)
return {tostring(count), tostring(total), average}
";

/// KEYS: review list, review record, restaurant hash, ranking.
/// ARGV: review id, restaurant id, recompute flag.
/// The record is only deleted when it belongs to the restaurant in ARGV[2].
const REMOVE_REVIEW: &str = r"
local unlinked = redis.call('LREM', KEYS[1], 0, ARGV[1])
local rating = false
local deleted = 0
if redis.call('HGET', KEYS[2], 'restaurantId') == ARGV[2] then
  rating = redis.call('HGET', KEYS[2], 'rating')
  deleted = redis.call('DEL', KEYS[2])
end
if ARGV[3] ~= '1' or unlinked == 0 or deleted == 0 or not rating then
  return {tostring(unlinked), tostring(deleted)}
end
local total = tonumber(redis.call('HINCRBYFLOAT', KEYS[3], 'totalStars', -tonumber(rating)))
local count = redis.call('LLEN', KEYS[1])
local average = 0
if count > 0 then
  average = math.floor(total / count * 10 + 0.5) / 10
end
average = string.format('%.1f', average)
redis.call('ZADD', KEYS[4], average, ARGV[2])
redis.call('HSET', KEYS[3], 'avgStars', average)
return {tostring(unlinked), tostring(deleted), tostring(count), tostring(total), average}
";

pub struct RedisStore {
    client: Client,
    connection: Mutex<Option<ConnectionManager>>,
    append_review: Script,
    remove_review: Script,
}

impl RedisStore {
    pub fn open(redis_url: &str) -> Result<Self, AppError> {
        Ok(Self {
            client: Client::open(redis_url)?,
            connection: Mutex::new(None),
            append_review: Script::new(APPEND_REVIEW),
            remove_review: Script::new(REMOVE_REVIEW),
        })
    }

    /// Connect now instead of on first use.
    pub async fn connect(&self) -> Result<(), AppError> {
        self.connection().await.map(|_| ())
    }

    async fn connection(&self) -> Result<ConnectionManager, AppError> {
        let mut slot = self.connection.lock().await;

        if let Some(connection) = slot.as_ref() {
            return Ok(connection.clone());
        }

        info!("Connecting to Redis...");

        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(500));

        let connection = self
            .client
            .get_connection_manager_with_config(config)
            .await?;

        info!("Redis connected");
        *slot = Some(connection.clone());

        Ok(connection)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn close(&self) {
        if self.connection.lock().await.take().is_some() {
            info!("Redis connection closed");
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.connection().await?;
        Ok(conn.exists(key).await?)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.connection().await?;
        Ok(conn.hget(key, field).await?)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, AppError> {
        let mut conn = self.connection().await?;
        Ok(conn.hgetall(key).await?)
    }

    async fn hincr(&self, key: &str, field: &str, delta: i64) -> Result<i64, AppError> {
        let mut conn = self.connection().await?;
        Ok(conn.hincr(key, field, delta).await?)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, AppError> {
        let mut conn = self.connection().await?;
        let mut members: Vec<String> = conn.smembers(key).await?;
        members.sort();
        Ok(members)
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, AppError> {
        let mut conn = self.connection().await?;
        Ok(conn.lrange(key, start, stop).await?)
    }

    async fn zrevrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, AppError> {
        let mut conn = self.connection().await?;
        Ok(conn.zrevrange(key, start, stop).await?)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, AppError> {
        let mut conn = self.connection().await?;
        Ok(conn.zscore(key, member).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.connection().await?;
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    async fn json_get(&self, key: &str) -> Result<Option<Value>, AppError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("JSON.GET")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        raw.map(|document| serde_json::from_str(&document))
            .transpose()
            .map_err(AppError::from)
    }

    async fn json_set(&self, key: &str, document: &Value) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("JSON.SET")
            .arg(key)
            .arg("$")
            .arg(document.to_string())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn execute(&self, batch: &Batch) -> Result<(), AppError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();

        for op in batch.ops() {
            match op {
                Op::HSet { key, fields } => pipe.hset_multiple(key, fields.as_slice()).ignore(),
                Op::SAdd { key, member } => pipe.sadd(key, member).ignore(),
                Op::ZAdd { key, member, score } => pipe.zadd(key, member, *score).ignore(),
            };
        }

        let mut conn = self.connection().await?;
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn append_review(
        &self,
        keys: &ReviewKeys,
        review_id: &str,
        rating: f64,
        record: &[(String, String)],
    ) -> Result<RatingUpdate, AppError> {
        let mut invocation = self.append_review.prepare_invoke();
        invocation
            .key(&keys.reviews)
            .key(&keys.review_details)
            .key(&keys.restaurant)
            .key(&keys.ranking)
            .arg(review_id)
            .arg(rating)
            .arg(&keys.restaurant_id);

        for (field, value) in record {
            invocation.arg(field).arg(value);
        }

        let mut conn = self.connection().await?;
        let reply: Vec<String> = invocation.invoke_async(&mut conn).await?;

        rating_from_reply(&reply)
    }

    async fn remove_review(
        &self,
        keys: &ReviewKeys,
        review_id: &str,
        recompute: bool,
    ) -> Result<ReviewRemoval, AppError> {
        let mut invocation = self.remove_review.prepare_invoke();
        invocation
            .key(&keys.reviews)
            .key(&keys.review_details)
            .key(&keys.restaurant)
            .key(&keys.ranking)
            .arg(review_id)
            .arg(&keys.restaurant_id)
            .arg(if recompute { "1" } else { "0" });

        let mut conn = self.connection().await?;
        let reply: Vec<String> = invocation.invoke_async(&mut conn).await?;

        match reply.as_slice() {
            [unlinked, deleted] => Ok(ReviewRemoval {
                unlinked: parse_reply(unlinked)?,
                deleted: parse_reply(deleted)?,
                rating: None,
            }),
            [unlinked, deleted, rest @ ..] => Ok(ReviewRemoval {
                unlinked: parse_reply(unlinked)?,
                deleted: parse_reply(deleted)?,
                rating: Some(rating_from_reply(rest)?),
            }),
            _ => Err(AppError::Store(format!(
                "unexpected remove_review reply: {reply:?}"
            ))),
        }
    }
}

fn rating_from_reply(reply: &[String]) -> Result<RatingUpdate, AppError> {
    match reply {
        [count, total, average] => Ok(RatingUpdate {
            review_count: parse_reply(count)?,
            total_stars: parse_reply(total)?,
            average: parse_reply(average)?,
        }),
        _ => Err(AppError::Store(format!("unexpected rating reply: {reply:?}"))),
    }
}

fn parse_reply<T: std::str::FromStr>(value: &str) -> Result<T, AppError> {
    value
        .parse()
        .map_err(|_| AppError::Store(format!("unparsable script reply value: {value}")))
}
