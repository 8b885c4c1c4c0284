//! Adapter over a redis server
//!
//! Unlike the other adapters this one connects eagerly: without a connection
//! it is unusable, so a failed connect is reported from construction.

use async_trait::async_trait;
use config::{CacheConfig, SerializerKind};
use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::{AsyncCommands, Client};
use serde_json::Value;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use crate::cacher::{CacheMap, Cacher};
use crate::errors::CacheError;
use crate::keys::{check_keys, check_values};
use crate::namespace::Namespace;
use crate::ttl::{Ttl, TtlNormalizer};

/// How values are encoded into redis strings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Serializer {
    /// Every value is stored as its JSON text
    #[default]
    Json,
    /// Strings are stored verbatim for interop with other redis clients;
    /// other values cannot be stored
    None,
}

impl Serializer {
    fn encode(&self, value: &Value) -> Result<String, CacheError> {
        match self {
            Self::Json => Ok(serde_json::to_string(value)?),
            Self::None => match value {
                Value::String(s) => Ok(s.clone()),
                _ => Err(CacheError::Backend(
                    "only strings can be stored without a serializer".to_string(),
                )),
            },
        }
    }

    fn decode(&self, payload: String) -> Result<Value, CacheError> {
        match self {
            Self::Json => Ok(serde_json::from_str(&payload)?),
            Self::None => Ok(Value::String(payload)),
        }
    }
}

impl From<SerializerKind> for Serializer {
    fn from(kind: SerializerKind) -> Self {
        match kind {
            SerializerKind::Json => Self::Json,
            SerializerKind::None => Self::None,
        }
    }
}

/// Connection settings of a [`RedisCacher`]
#[derive(Debug, Clone)]
pub struct RedisOptions {
    /// Redis connection string (redis://127.0.0.1:6379)
    pub url: String,
    pub namespace: Namespace,
    /// Default TTL for entries (in seconds)
    pub default_ttl: u64,
    pub connect_timeout: Duration,
    /// Applied to every command when set
    pub response_timeout: Option<Duration>,
    /// Extra connection attempts after the first one fails
    pub retries: u32,
    pub retry_delay: Duration,
    pub serializer: Serializer,
}

impl RedisOptions {
    pub fn new(url: impl Into<String>, namespace: Namespace) -> Self {
        Self {
            url: url.into(),
            namespace,
            default_ttl: 0,
            connect_timeout: Duration::from_millis(2500),
            response_timeout: None,
            retries: 0,
            retry_delay: Duration::from_millis(100),
            serializer: Serializer::Json,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let url = config
            .targets()
            .into_iter()
            .next()
            .unwrap_or_else(|| config::DEFAULT_REDIS_URL.to_string());
        let namespace = Namespace::resolve(
            config.namespace.as_deref(),
            config.namespace_seed.as_deref(),
        );

        Self {
            url,
            namespace,
            default_ttl: config.default_ttl,
            connect_timeout: Duration::from_millis(config.redis.connect_timeout_ms),
            response_timeout: config.redis.response_timeout_ms.map(Duration::from_millis),
            retries: config.redis.retries,
            retry_delay: Duration::from_millis(config.redis.retry_delay_ms),
            serializer: config.redis.serializer.into(),
        }
    }

    pub fn with_default_ttl(mut self, default_ttl: u64) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }

    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }
}

/// Cache on redis. Reads pair `GET` with `EXISTS` inside one transaction,
/// so a stored `null` or `false` is never mistaken for a miss.
///
/// Generic over the connection so any [`ConnectionLike`] handle that clones
/// cheaply can sit underneath; production code uses the multiplexed one.
#[derive(Clone)]
pub struct RedisCacher<C = MultiplexedConnection> {
    connection: C,
    namespace: Namespace,
    ttl: TtlNormalizer,
    serializer: Serializer,
    response_timeout: Option<Duration>,
    url: String,
}

impl<C> Debug for RedisCacher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacher")
            .field("url", &self.url)
            .field("namespace", &self.namespace)
            .field("default_ttl", &self.ttl.default_ttl())
            .field("serializer", &self.serializer)
            .finish()
    }
}

impl RedisCacher<MultiplexedConnection> {
    /// Connect to redis, retrying as configured
    pub async fn connect(options: RedisOptions) -> Result<Self, CacheError> {
        let client = Client::open(options.url.as_str())?;

        let mut attempt = 0;
        let connection = loop {
            match tokio::time::timeout(
                options.connect_timeout,
                client.get_multiplexed_async_connection(),
            )
            .await
            {
                Ok(Ok(connection)) => break connection,
                Ok(Err(e)) if attempt >= options.retries => {
                    return Err(CacheError::Connection(format!(
                        "cannot connect to {}: {}",
                        options.url, e
                    )));
                }
                Err(_) if attempt >= options.retries => {
                    return Err(CacheError::Connection(format!(
                        "timed out connecting to {} after {:?}",
                        options.url, options.connect_timeout
                    )));
                }
                _ => {
                    attempt += 1;
                    debug_log!("redis connect attempt {} to {} failed", attempt, options.url);
                    tokio::time::sleep(options.retry_delay).await;
                }
            }
        };

        Ok(Self::new(connection, options))
    }

    pub async fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::connect(RedisOptions::from_config(config)).await
    }
}

impl<C> RedisCacher<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    /// Wrap an already established connection
    pub fn new(connection: C, options: RedisOptions) -> Self {
        Self {
            connection,
            namespace: options.namespace,
            ttl: TtlNormalizer::new(options.default_ttl),
            serializer: options.serializer,
            response_timeout: options.response_timeout,
            url: options.url,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<String, CacheError> {
        let mut conn = self.connection.clone();
        self.bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await
    }

    /// Await a redis call, bounded by the response timeout
    async fn bounded<T, F>(&self, call: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match self.response_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| CacheError::Timeout)?
                .map_err(CacheError::from),
            None => call.await.map_err(CacheError::from),
        }
    }

    async fn store(&self, key: &str, value: &Value, ttl: u64) -> Result<(), CacheError> {
        let payload = self.serializer.encode(value)?;
        let mut conn = self.connection.clone();
        let key = self.namespace.apply(key);

        if ttl > 0 {
            self.bounded(async move { conn.set_ex(key, payload, ttl).await })
                .await
        } else {
            self.bounded(async move { conn.set(key, payload).await })
                .await
        }
    }

    async fn fetch(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.connection.clone();
        let key = self.namespace.apply(key);

        let (payload, exists): (Option<String>, bool) = self
            .bounded(async move {
                redis::pipe()
                    .atomic()
                    .get(&key)
                    .exists(&key)
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        match (payload, exists) {
            (Some(payload), true) => Ok(Some(self.serializer.decode(payload)?)),
            _ => Ok(None),
        }
    }

    /// `MGET` plus one `EXISTS` per key, all in one transaction
    async fn fetch_many(&self, prefixed: &[String]) -> Result<Vec<Option<Value>>, CacheError> {
        let mut pipe = redis::pipe();
        pipe.atomic().mget(prefixed);
        for key in prefixed {
            pipe.exists(key);
        }

        let mut conn = self.connection.clone();
        let replies: Vec<redis::Value> = self
            .bounded(async move { pipe.query_async(&mut conn).await })
            .await?;

        let Some((values, flags)) = replies.split_first() else {
            return Err(CacheError::Backend("empty transaction reply".to_string()));
        };
        let payloads: Vec<Option<String>> = redis::from_redis_value(values)?;
        if payloads.len() != prefixed.len() || flags.len() != prefixed.len() {
            return Err(CacheError::Backend("transaction reply length mismatch".to_string()));
        }

        let mut fetched = Vec::with_capacity(prefixed.len());
        for (payload, flag) in payloads.into_iter().zip(flags) {
            let exists: bool = redis::from_redis_value(flag)?;
            fetched.push(match (payload, exists) {
                (Some(payload), true) => match self.serializer.decode(payload) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::warn!(error = %e, "undecodable redis payload");
                        None
                    }
                },
                _ => None,
            });
        }
        Ok(fetched)
    }
}

#[async_trait]
impl<C> Cacher for RedisCacher<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str, default: Value) -> Value {
        match self.fetch(key).await {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key, error = %e, "redis get failed");
                default
            }
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> bool {
        match self.store(key, &value, self.ttl.normalize(&ttl)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "redis set failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let mut conn = self.connection.clone();
        let prefixed = self.namespace.apply(key);
        let deleted: Result<i64, CacheError> = self
            .bounded(async move { conn.del(prefixed).await })
            .await;
        match deleted {
            Ok(deleted) => deleted > 0,
            Err(e) => {
                tracing::warn!(key, error = %e, "redis delete failed");
                false
            }
        }
    }

    async fn has(&self, key: &str) -> bool {
        let mut conn = self.connection.clone();
        let prefixed = self.namespace.apply(key);
        let exists: Result<bool, CacheError> = self
            .bounded(async move { conn.exists(prefixed).await })
            .await;
        match exists {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(key, error = %e, "redis exists failed");
                false
            }
        }
    }

    async fn get_multiple(&self, keys: Vec<Value>, default: Value) -> Result<CacheMap, CacheError> {
        let keys = check_keys(keys)?;
        let prefixed: Vec<String> = keys.iter().map(|k| self.namespace.apply(k.as_str())).collect();

        let fetched = if prefixed.is_empty() {
            Vec::new()
        } else {
            match self.fetch_many(&prefixed).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    tracing::warn!(keys = prefixed.len(), error = %e, "redis get_multiple failed");
                    Vec::new()
                }
            }
        };

        let mut fetched = fetched.into_iter();
        let mut values = CacheMap::new();
        for key in keys {
            let value = fetched.next().flatten().unwrap_or_else(|| default.clone());
            values.insert(key.into_string(), value);
        }
        Ok(values)
    }

    async fn set_multiple(&self, values: Vec<(Value, Value)>, ttl: Ttl) -> Result<bool, CacheError> {
        let values = check_values(values)?;
        let ttl = self.ttl.normalize(&ttl);

        // No multi-set with per-key expiry exists, so each key is written on
        // its own; one failure does not stop the remaining writes.
        let mut success = true;
        for (key, value) in &values {
            if let Err(e) = self.store(key.as_str(), value, ttl).await {
                tracing::warn!(key = key.as_str(), error = %e, "redis set failed");
                success = false;
            }
        }
        Ok(success)
    }

    async fn delete_multiple(&self, keys: Vec<Value>) -> Result<bool, CacheError> {
        let prefixed: Vec<String> = check_keys(keys)?
            .iter()
            .map(|k| self.namespace.apply(k.as_str()))
            .collect();
        if prefixed.is_empty() {
            return Ok(true);
        }

        let mut conn = self.connection.clone();
        let count = prefixed.len();
        let deleted: Result<i64, CacheError> = self
            .bounded(async move { conn.del(prefixed).await })
            .await;
        match deleted {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(keys = count, error = %e, "redis delete_multiple failed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis_test::{MockCmd, MockRedisConnection};
    use serde_json::json;

    #[test]
    fn test_json_serializer_roundtrip() {
        let serializer = Serializer::Json;
        for value in [json!(null), json!(false), json!(0), json!(""), json!({"a": [1, 2]})] {
            let payload = serializer.encode(&value).unwrap();
            assert_eq!(serializer.decode(payload).unwrap(), value);
        }
    }

    #[test]
    fn test_raw_serializer_only_takes_strings() {
        let serializer = Serializer::None;
        assert_eq!(serializer.encode(&json!("plain")).unwrap(), "plain");
        assert!(serializer.encode(&json!(1)).is_err());
        assert_eq!(serializer.decode("1".to_string()).unwrap(), json!("1"));
    }

    #[test]
    fn test_options_from_config() {
        let mut config = CacheConfig::new(config::BackendKind::Redis)
            .with_namespace("r:")
            .with_default_ttl(30);
        config.redis.response_timeout_ms = Some(250);
        config.redis.retries = 2;
        config.redis.serializer = SerializerKind::None;

        let options = RedisOptions::from_config(&config);
        assert_eq!(options.url, config::DEFAULT_REDIS_URL);
        assert_eq!(options.namespace.as_str(), "r:");
        assert_eq!(options.default_ttl, 30);
        assert_eq!(options.connect_timeout, Duration::from_millis(2500));
        assert_eq!(options.response_timeout, Some(Duration::from_millis(250)));
        assert_eq!(options.retries, 2);
        assert_eq!(options.serializer, Serializer::None);
    }

    #[tokio::test]
    async fn test_connect_failure_is_construction_error() {
        let options = RedisOptions::new("redis://127.0.0.1:1", Namespace::new("x:"))
            .with_connect_timeout(Duration::from_millis(500))
            .with_retries(1, Duration::from_millis(10));

        let err = RedisCacher::connect(options).await.unwrap_err();
        assert!(matches!(err, CacheError::Connection(_)));
    }

    fn mocked(commands: Vec<MockCmd>) -> RedisCacher<MockRedisConnection> {
        RedisCacher::new(
            MockRedisConnection::new(commands),
            RedisOptions::new("redis://mock", Namespace::new("t:")),
        )
    }

    fn get_pipeline(key: &str) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic().get(key).exists(key);
        pipe
    }

    fn set_cmd(key: &str, payload: &str) -> redis::Cmd {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(payload);
        cmd
    }

    fn bulk(payload: &str) -> redis::Value {
        redis::Value::BulkString(payload.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_stored_falsy_values_are_hits() {
        let cacher = mocked(vec![
            MockCmd::with_values(
                get_pipeline("t:null"),
                Ok(vec![redis::Value::Array(vec![bulk("null"), redis::Value::Int(1)])]),
            ),
            MockCmd::with_values(
                get_pipeline("t:false"),
                Ok(vec![redis::Value::Array(vec![bulk("false"), redis::Value::Int(1)])]),
            ),
            MockCmd::with_values(
                get_pipeline("t:absent"),
                Ok(vec![redis::Value::Array(vec![redis::Value::Nil, redis::Value::Int(0)])]),
            ),
        ]);

        assert_eq!(cacher.get("null", json!("miss")).await, json!(null));
        assert_eq!(cacher.get("false", json!("miss")).await, json!(false));
        assert_eq!(cacher.get("absent", json!("miss")).await, json!("miss"));
    }

    #[tokio::test]
    async fn test_get_multiple_pairs_mget_with_exists() {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .mget(&["t:a".to_string(), "t:b".to_string(), "t:c".to_string()])
            .exists("t:a")
            .exists("t:b")
            .exists("t:c");

        let cacher = mocked(vec![MockCmd::with_values(
            pipe,
            Ok(vec![redis::Value::Array(vec![
                redis::Value::Array(vec![bulk("1"), bulk("null"), redis::Value::Nil]),
                redis::Value::Int(1),
                redis::Value::Int(1),
                redis::Value::Int(0),
            ])]),
        )]);

        let values = cacher
            .get_multiple(vec![json!("a"), json!("b"), json!("c")], json!("d"))
            .await
            .unwrap();
        assert_eq!(Value::Object(values), json!({"a": 1, "b": null, "c": "d"}));
    }

    #[tokio::test]
    async fn test_short_transaction_reply_falls_back_to_defaults() {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .mget(&["t:a".to_string(), "t:b".to_string()])
            .exists("t:a")
            .exists("t:b");

        // One payload for two keys
        let cacher = mocked(vec![MockCmd::with_values(
            pipe,
            Ok(vec![redis::Value::Array(vec![
                redis::Value::Array(vec![bulk("1")]),
                redis::Value::Int(1),
                redis::Value::Int(1),
            ])]),
        )]);

        let values = cacher
            .get_multiple(vec![json!("a"), json!("b")], json!("d"))
            .await
            .unwrap();
        assert_eq!(Value::Object(values), json!({"a": "d", "b": "d"}));
    }

    #[tokio::test]
    async fn test_set_multiple_reports_any_failed_key() {
        let cacher = mocked(vec![
            MockCmd::new(
                set_cmd("t:a", "1"),
                Ok(redis::Value::Okay),
            ),
            MockCmd::new(
                set_cmd("t:b", "2"),
                Err::<redis::Value, _>(redis::RedisError::from((
                    redis::ErrorKind::ResponseError,
                    "OOM command not allowed",
                ))),
            ),
            MockCmd::new(
                set_cmd("t:c", "3"),
                Ok(redis::Value::Okay),
            ),
            MockCmd::with_values(
                get_pipeline("t:c"),
                Ok(vec![redis::Value::Array(vec![bulk("3"), redis::Value::Int(1)])]),
            ),
        ]);

        let stored = cacher
            .set_multiple(
                vec![(json!("a"), json!(1)), (json!("b"), json!(2)), (json!("c"), json!(3))],
                Ttl::Default,
            )
            .await
            .unwrap();
        assert!(!stored);

        // The write after the failure still went out
        assert_eq!(cacher.get("c", json!("miss")).await, json!(3));
    }

    #[tokio::test]
    async fn test_set_multiple_all_stored() {
        let cacher = mocked(vec![
            MockCmd::new(
                set_cmd("t:a", "1"),
                Ok(redis::Value::Okay),
            ),
            MockCmd::new(
                set_cmd("t:b", "\"x\""),
                Ok(redis::Value::Okay),
            ),
        ]);

        let stored = cacher
            .set_multiple(vec![(json!("a"), json!(1)), (json!("b"), json!("x"))], Ttl::Default)
            .await
            .unwrap();
        assert!(stored);
    }

    #[tokio::test]
    async fn test_malformed_url_is_rejected() {
        let options = RedisOptions::new("not a url", Namespace::new("x:"));
        assert!(RedisCacher::connect(options).await.is_err());
    }
}
