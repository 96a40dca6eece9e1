use std::{fmt, sync::Arc, time::Duration};

use redis::{Client, Cmd, FromRedisValue, IntoConnectionInfo, Script, aio::ConnectionManager};

use crate::{CountingStore, SwarmLimitError, store::select_shard};

const ADMIT_SCRIPT: &str = r#"
    local key = KEYS[1]

    -- scores stay strings; Lua numbers are formatted back with 14 digits
    local window_start = ARGV[1]
    local score = ARGV[2]
    local member = ARGV[3]
    local max_hits = tonumber(ARGV[4])
    local ttl_ms = tonumber(ARGV[5])

    redis.call("ZREMRANGEBYSCORE", key, 0, window_start)

    local count = redis.call("ZCARD", key)
    if count >= max_hits then
        return 0
    end

    redis.call("ZADD", key, score, member)
    redis.call("PEXPIRE", key, ttl_ms)

    return 1
"#;

/// Connection settings for [`RedisStore`].
///
/// # Examples
///
/// ```ignore
/// use std::time::Duration;
/// use swarmlimit::{RedisStore, RedisStoreOptions};
///
/// let store = RedisStore::connect(RedisStoreOptions {
///     urls: vec![
///         "redis://10.0.0.1:6379/".to_string(),
///         "redis://10.0.0.2:6379/".to_string(),
///     ],
///     password: None,
///     command_timeout: Duration::from_millis(25),
///     ..Default::default()
/// })
/// .await?;
/// ```
#[derive(Clone, Debug)]
pub struct RedisStoreOptions {
    /// One URL per shard. All fleet members must list the same shards.
    pub urls: Vec<String>,

    /// Password applied to every shard, overriding any in the URLs.
    pub password: Option<String>,

    /// Upper bound for establishing the connection to one shard.
    ///
    /// Defaults to 1 second.
    pub connect_timeout: Duration,

    /// Upper bound for one store command when the caller supplies no
    /// deadline. Expired commands fail with
    /// [`SwarmLimitError::StoreUnavailable`].
    ///
    /// Defaults to 25 milliseconds.
    pub command_timeout: Duration,
}

impl Default for RedisStoreOptions {
    fn default() -> Self {
        Self {
            urls: vec!["redis://127.0.0.1:6379/".to_string()],
            password: None,
            connect_timeout: Duration::from_secs(1),
            command_timeout: Duration::from_millis(25),
        }
    }
}

#[derive(Clone)]
struct Shard {
    name: Arc<str>,
    connection: ConnectionManager,
}

/// [`CountingStore`] over one or more Redis instances.
///
/// With several shards each key lives on exactly one of them, chosen by
/// rendezvous hashing on the shard address. Connections are multiplexed
/// [`ConnectionManager`]s that reconnect on their own; the store never closes
/// them explicitly, they go away with the last clone.
#[derive(Clone)]
pub struct RedisStore {
    shards: Arc<[Shard]>,
    command_timeout: Duration,
    admit_script: Script,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field(
                "shards",
                &self.shards.iter().map(|shard| &*shard.name).collect::<Vec<_>>(),
            )
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl RedisStore {
    /// Connect to every shard in `options`.
    pub async fn connect(options: RedisStoreOptions) -> Result<Self, SwarmLimitError> {
        if options.urls.is_empty() {
            return Err(SwarmLimitError::InvalidStoreOptions(
                "at least one redis url is required".to_string(),
            ));
        }
        if options.connect_timeout.is_zero() || options.command_timeout.is_zero() {
            return Err(SwarmLimitError::InvalidStoreOptions(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        let mut shards = Vec::with_capacity(options.urls.len());

        for url in &options.urls {
            let mut info = url.as_str().into_connection_info().map_err(|err| {
                SwarmLimitError::InvalidStoreOptions(format!("invalid redis url: {err}"))
            })?;
            if let Some(password) = &options.password {
                info.redis.password = Some(password.clone());
            }

            let name: Arc<str> = Arc::from(info.addr.to_string());
            let client = Client::open(info)?;
            let connection =
                tokio::time::timeout(options.connect_timeout, client.get_connection_manager())
                    .await
                    .map_err(|_| SwarmLimitError::timed_out(options.connect_timeout))??;

            tracing::debug!(shard = %name, "connected to redis shard");
            shards.push(Shard { name, connection });
        }

        Ok(Self::from_shards(shards, options.command_timeout))
    }

    /// Single-shard store over an existing connection.
    pub fn from_connection_manager(connection: ConnectionManager, command_timeout: Duration) -> Self {
        let shard = Shard {
            name: Arc::from("default"),
            connection,
        };

        Self::from_shards(vec![shard], command_timeout)
    }

    fn from_shards(shards: Vec<Shard>, command_timeout: Duration) -> Self {
        Self {
            shards: Arc::from(shards),
            command_timeout,
            admit_script: Script::new(ADMIT_SCRIPT),
        }
    }

    /// Number of shards in the ring.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn connection_for(&self, key: &str) -> ConnectionManager {
        let index = select_shard(self.shards.iter().map(|shard| &*shard.name), key);
        self.shards[index].connection.clone()
    }

    async fn query<T: FromRedisValue>(&self, key: &str, cmd: Cmd) -> Result<T, SwarmLimitError> {
        let mut connection = self.connection_for(key);

        match tokio::time::timeout(self.command_timeout, cmd.query_async(&mut connection)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SwarmLimitError::timed_out(self.command_timeout)),
        }
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

impl CountingStore for RedisStore {
    async fn remove_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<u64, SwarmLimitError> {
        let mut cmd = redis::cmd("ZREMRANGEBYSCORE");
        cmd.arg(key).arg(min).arg(max);
        self.query(key, cmd).await
    }

    async fn cardinality(&self, key: &str) -> Result<u64, SwarmLimitError> {
        let mut cmd = redis::cmd("ZCARD");
        cmd.arg(key);
        self.query(key, cmd).await
    }

    async fn add_scored(&self, key: &str, score: f64, member: &str) -> Result<u64, SwarmLimitError> {
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key).arg(score).arg(member);
        self.query(key, cmd).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, SwarmLimitError> {
        let mut cmd = redis::cmd("PEXPIRE");
        cmd.arg(key).arg(ttl_millis(ttl));
        self.query(key, cmd).await
    }

    async fn lowest_in_range(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Option<String>, SwarmLimitError> {
        let mut cmd = redis::cmd("ZRANGEBYSCORE");
        cmd.arg(key).arg(min).arg(max).arg("LIMIT").arg(0).arg(1);
        let members: Vec<String> = self.query(key, cmd).await?;

        Ok(members.into_iter().next())
    }

    async fn admit_atomic(
        &self,
        key: &str,
        window_start: f64,
        score: f64,
        member: &str,
        max_hits: u64,
        ttl: Duration,
    ) -> Result<bool, SwarmLimitError> {
        let mut connection = self.connection_for(key);

        let result = tokio::time::timeout(
            self.command_timeout,
            self.admit_script
                .key(key)
                .arg(window_start)
                .arg(score)
                .arg(member)
                .arg(max_hits)
                .arg(ttl_millis(ttl))
                .invoke_async(&mut connection),
        )
        .await;

        match result {
            Ok(admitted) => {
                let admitted: bool = admitted?;
                Ok(admitted)
            }
            Err(_) => Err(SwarmLimitError::timed_out(self.command_timeout)),
        }
    }
}
