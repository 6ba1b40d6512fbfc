//! Redis-backed durable scheduled work.
//!
//! Layout under the configured prefix:
//! * `{prefix}:checkpoint:{id}` checkpoint JSON, expires after the
//!   checkpoint TTL
//! * `{prefix}:wake-index` sorted set of ids scored by wake time (ms)
//! * `{prefix}:processing:{id}` claim marker set with `NX`, expires after
//!   the claim TTL so a crashed worker's checkpoint becomes claimable again

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use messenger_core::config::RedisConfig;
use messenger_core::error::{MessengerError, MessengerResult};
use messenger_core::store::{CheckpointStore, ClaimOutcome};
use messenger_core::types::{CheckpointStatus, ExecutionCheckpoint};
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct RedisCheckpointStore {
    client: redis::Client,
    keys: KeyLayout,
    checkpoint_ttl_secs: u64,
    claim_ttl_secs: u64,
    owner: String,
}

#[derive(Debug, Clone)]
struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    fn checkpoint(&self, id: Uuid) -> String {
        format!("{}:checkpoint:{id}", self.prefix)
    }

    fn processing(&self, id: Uuid) -> String {
        format!("{}:processing:{id}", self.prefix)
    }

    fn wake_index(&self) -> String {
        format!("{}:wake-index", self.prefix)
    }
}

fn store_err(e: redis::RedisError) -> MessengerError {
    MessengerError::Store(format!("redis: {e}"))
}

impl RedisCheckpointStore {
    /// Connect to Redis (first configured URL). `owner` is written into
    /// claim markers to identify the node holding them.
    pub async fn connect(config: &RedisConfig, owner: &str) -> anyhow::Result<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Connecting to Redis");

        let client = redis::Client::open(url.as_str())?;

        // Verify connectivity
        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis connection established");

        Ok(Self {
            client,
            keys: KeyLayout {
                prefix: config.key_prefix.clone(),
            },
            checkpoint_ttl_secs: config.checkpoint_ttl_secs,
            claim_ttl_secs: config.claim_ttl_secs,
            owner: owner.to_string(),
        })
    }

    async fn conn(&self) -> MessengerResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_err)
    }
}

#[async_trait]
impl CheckpointStore for RedisCheckpointStore {
    async fn save(&self, checkpoint: &ExecutionCheckpoint) -> MessengerResult<()> {
        let mut stored = checkpoint.clone();
        stored.status = CheckpointStatus::Scheduled;
        let json = serde_json::to_string(&stored)?;
        let id = stored.execution_id;

        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .set_ex(self.keys.checkpoint(id), json, self.checkpoint_ttl_secs)
            .ignore()
            .zadd(self.keys.wake_index(), id.to_string(), wake_score(stored.wake_at))
            .ignore()
            .del(self.keys.processing(id))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_err)?;

        debug!(execution_id = %id, wake_at = %stored.wake_at, "Checkpoint saved");
        Ok(())
    }

    async fn load(&self, execution_id: Uuid) -> MessengerResult<Option<ExecutionCheckpoint>> {
        let mut conn = self.conn().await?;
        let (data, processing): (Option<String>, bool) = redis::pipe()
            .get(self.keys.checkpoint(execution_id))
            .exists(self.keys.processing(execution_id))
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        match data {
            Some(json) => {
                let mut checkpoint: ExecutionCheckpoint = serde_json::from_str(&json)?;
                if processing {
                    checkpoint.status = CheckpointStatus::Processing;
                }
                Ok(Some(checkpoint))
            }
            None => Ok(None),
        }
    }

    async fn claim(&self, execution_id: Uuid) -> MessengerResult<ClaimOutcome> {
        let mut conn = self.conn().await?;
        let processing_key = self.keys.processing(execution_id);

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&processing_key)
            .arg(&self.owner)
            .arg("NX")
            .arg("EX")
            .arg(self.claim_ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        if acquired.is_none() {
            metrics::counter!("checkpoint.claim.contended").increment(1);
            return Ok(ClaimOutcome::AlreadyProcessing);
        }

        let data: Option<String> = conn
            .get(self.keys.checkpoint(execution_id))
            .await
            .map_err(store_err)?;
        match data {
            Some(json) => {
                let mut checkpoint: ExecutionCheckpoint = serde_json::from_str(&json)?;
                checkpoint.status = CheckpointStatus::Processing;
                Ok(ClaimOutcome::Claimed(checkpoint))
            }
            None => {
                // Completed or expired under us; release the marker.
                if let Err(e) = conn.del::<_, ()>(&processing_key).await {
                    warn!(execution_id = %execution_id, error = %e, "Failed to release claim marker");
                }
                Ok(ClaimOutcome::Missing)
            }
        }
    }

    async fn delete(&self, execution_id: Uuid) -> MessengerResult<()> {
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .del(self.keys.checkpoint(execution_id))
            .ignore()
            .zrem(self.keys.wake_index(), execution_id.to_string())
            .ignore()
            .del(self.keys.processing(execution_id))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> MessengerResult<Vec<Uuid>> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = conn
            .zrangebyscore_limit(
                self.keys.wake_index(),
                "-inf",
                wake_score(now),
                0,
                limit as isize,
            )
            .await
            .map_err(store_err)?;

        Ok(members
            .into_iter()
            .filter_map(|m| match Uuid::parse_str(&m) {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(member = %m, "Ignoring malformed wake-index member");
                    None
                }
            })
            .collect())
    }
}

fn wake_score(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}
