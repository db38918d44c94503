//! Redis-backed [`EphemeralStore`] implementation, grounded directly on
//! `examples/original_source/project_W/caching.py`'s `RedisAdapter`: key
//! naming (`online_runner:<id>`, `in_process_job:<id>`, `job_events:<user>`,
//! the `online_runners_sorted`/`job_queue_sorted` sorted sets), the
//! pop-and-retry assignment loop, and the pipeline-as-atomic-grouping shape.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use transcriptord_core::{
    DomainEvent, EventKind, InProcessJob, JobId, OnlineRunner, RunnerId, UserId,
};

use crate::error::{CacheError, CacheResult};
use crate::store::{EphemeralStore, EventStream};

const RUNNER_SORTED_SET: &str = "online_runners_sorted";
const JOB_QUEUE_SORTED_SET: &str = "job_queue_sorted";

fn runner_key(id: RunnerId) -> String {
    format!("online_runner:{}", id.get())
}

fn job_key(id: JobId) -> String {
    format!("in_process_job:{}", id.get())
}

/// Connection parameters for the ephemeral store (SPEC §6 "Configuration
/// surface" `redis` section).
#[derive(Debug, Clone)]
pub struct EphemeralStoreConfig {
    /// Either form is accepted, matching the reference's `RedisConnection`
    /// model: a Unix socket path, or a full `redis://`/`rediss://` URL.
    pub connection_string: String,
}

/// The production [`EphemeralStore`]: one multiplexed connection for
/// commands/pipelines, plus fresh pub/sub connections opened per
/// subscription (Redis multiplexes commands but not subscriptions onto the
/// same connection).
pub struct RedisEphemeralStore {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisEphemeralStore {
    pub async fn open(config: &EphemeralStoreConfig) -> CacheResult<Self> {
        let client = redis::Client::open(config.connection_string.as_str())?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { client, conn })
    }

    pub async fn close(&self) -> CacheResult<()> {
        // `ConnectionManager` has no explicit close; dropping it tears down
        // the underlying connection. Kept for symmetry with `PgDurableStore`'s
        // idempotent open/close pair (SPEC §9 "Global mutable state").
        Ok(())
    }

    fn hash_to_runner(id: RunnerId, fields: &HashMap<String, String>) -> CacheResult<OnlineRunner> {
        let get = |k: &str| {
            fields
                .get(k)
                .cloned()
                .ok_or_else(|| CacheError::inconsistent(format!("{} missing field {k}", runner_key(id))))
        };
        Ok(OnlineRunner {
            id,
            name: get("name")?,
            version: get("version")?,
            git_hash: get("git_hash")?,
            source_url: get("source_url")?,
            priority: get("priority")?
                .parse()
                .map_err(|_| CacheError::inconsistent("priority not an integer"))?,
            session_token_hash: get("session_token_hash")?,
            assigned_job_id: fields
                .get("assigned_job_id")
                .and_then(|v| v.parse::<i64>().ok())
                .map(JobId::new),
            in_process: fields.get("in_process").map(|v| v == "1").unwrap_or(false),
        })
    }

    fn runner_to_hash(runner: &OnlineRunner) -> Vec<(String, String)> {
        let mut fields = vec![
            ("name".to_string(), runner.name.clone()),
            ("version".to_string(), runner.version.clone()),
            ("git_hash".to_string(), runner.git_hash.clone()),
            ("source_url".to_string(), runner.source_url.clone()),
            ("priority".to_string(), runner.priority.to_string()),
            (
                "session_token_hash".to_string(),
                runner.session_token_hash.clone(),
            ),
            (
                "in_process".to_string(),
                if runner.in_process { "1" } else { "0" }.to_string(),
            ),
        ];
        if let Some(job_id) = runner.assigned_job_id {
            fields.push(("assigned_job_id".to_string(), job_id.get().to_string()));
        }
        fields
    }

    fn hash_to_in_process_job(fields: &HashMap<String, String>) -> CacheResult<InProcessJob> {
        let get = |k: &str| {
            fields
                .get(k)
                .cloned()
                .ok_or_else(|| CacheError::inconsistent(format!("in_process_job missing field {k}")))
        };
        Ok(InProcessJob {
            runner_id: RunnerId::new(
                get("runner_id")?
                    .parse()
                    .map_err(|_| CacheError::inconsistent("runner_id not an integer"))?,
            ),
            user_id: UserId::new(
                get("user_id")?
                    .parse()
                    .map_err(|_| CacheError::inconsistent("user_id not an integer"))?,
            ),
            progress: get("progress")?
                .parse()
                .map_err(|_| CacheError::inconsistent("progress not a float"))?,
            abort: fields.get("abort").map(|v| v == "1").unwrap_or(false),
        })
    }
}

#[async_trait]
impl EphemeralStore for RedisEphemeralStore {
    async fn register_online_runner(
        &self,
        runner: OnlineRunner,
        ttl: Duration,
    ) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let key = runner_key(runner.id);
        let fields = Self::runner_to_hash(&runner);
        redis::pipe()
            .atomic()
            .hset_multiple(&key, &fields)
            .expire(&key, ttl.as_secs() as i64)
            .zadd(RUNNER_SORTED_SET, runner.id.get(), runner.priority as f64)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_online_runner(&self, runner_id: RunnerId) -> CacheResult<Option<OnlineRunner>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(runner_key(runner_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::hash_to_runner(runner_id, &fields)?))
    }

    async fn reset_runner_expiration(
        &self,
        runner_id: RunnerId,
        ttl: Duration,
    ) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let key = runner_key(runner_id);
        let assigned_job_id: Option<i64> = conn.hget(&key, "assigned_job_id").await?;
        let ttl_secs = ttl.as_secs() as i64;
        let mut pipe = redis::pipe();
        pipe.atomic().expire(&key, ttl_secs);
        if let Some(job_id) = assigned_job_id {
            pipe.expire(job_key(JobId::new(job_id)), ttl_secs);
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn mark_runner_in_process(&self, runner_id: RunnerId) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(runner_key(runner_id), "in_process", "1")
            .await?;
        Ok(())
    }

    async fn unregister_online_runner(
        &self,
        runner_id: RunnerId,
    ) -> CacheResult<Option<(JobId, UserId)>> {
        let mut conn = self.conn.clone();
        let key = runner_key(runner_id);
        let assigned_job_id: Option<i64> = conn.hget(&key, "assigned_job_id").await?;
        redis::pipe()
            .atomic()
            .del(&key)
            .zrem(RUNNER_SORTED_SET, runner_id.get())
            .query_async::<()>(&mut conn)
            .await?;

        let Some(job_id) = assigned_job_id.map(JobId::new) else {
            return Ok(None);
        };
        let jkey = job_key(job_id);
        let user_id: Option<i64> = conn.hget(&jkey, "user_id").await?;
        let Some(user_id) = user_id.map(UserId::new) else {
            return Err(CacheError::inconsistent(format!(
                "{jkey} had no user_id while its runner {runner_id} unregistered"
            )));
        };
        redis::pipe()
            .atomic()
            .del(&jkey)
            .publish(
                DomainEvent::channel_name(user_id),
                serde_json::to_string(&DomainEvent::new(user_id, job_id, EventKind::JobUpdated))
                    .unwrap_or_default(),
            )
            .query_async::<()>(&mut conn)
            .await?;
        Ok(Some((job_id, user_id)))
    }

    async fn enqueue_job(&self, job_id: JobId, priority: f64) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(JOB_QUEUE_SORTED_SET, job_id.get(), priority)
            .await?;
        Ok(())
    }

    async fn remove_job_from_queue(&self, job_id: JobId) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        conn.zrem::<_, _, ()>(JOB_QUEUE_SORTED_SET, job_id.get())
            .await?;
        Ok(())
    }

    async fn queue_contains_job(&self, job_id: JobId) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = conn.zscore(JOB_QUEUE_SORTED_SET, job_id.get()).await?;
        Ok(score.is_some())
    }

    async fn queue_len(&self) -> CacheResult<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(JOB_QUEUE_SORTED_SET).await?)
    }

    async fn peek_highest_priority_unassigned_job(&self) -> CacheResult<Option<JobId>> {
        let mut conn = self.conn.clone();
        let mut rank = 0isize;
        loop {
            let ids: Vec<i64> = conn
                .zrevrange(JOB_QUEUE_SORTED_SET, rank, rank)
                .await?;
            let Some(job_id) = ids.first().copied().map(JobId::new) else {
                return Ok(None);
            };
            let in_process: bool = conn.exists(job_key(job_id)).await?;
            if !in_process {
                return Ok(Some(job_id));
            }
            rank += 1;
        }
    }

    async fn assign_job_to_runner(
        &self,
        job_id: JobId,
        user_id: UserId,
        ttl: Duration,
    ) -> CacheResult<Option<RunnerId>> {
        let mut conn = self.conn.clone();

        // Pop-and-retry loop: a popped-but-unusable runner (stale/already
        // assigned) is discarded rather than re-inserted (SPEC §9).
        let runner_id = loop {
            let popped: Vec<(i64, f64)> = conn.zpopmax(RUNNER_SORTED_SET, 1).await?;
            let Some((id, _)) = popped.into_iter().next() else {
                return Ok(None);
            };
            let runner_id = RunnerId::new(id);
            let fields: HashMap<String, String> = conn.hgetall(runner_key(runner_id)).await?;
            if fields.is_empty() || fields.contains_key("assigned_job_id") {
                continue;
            }
            break runner_id;
        };

        let rkey = runner_key(runner_id);
        let jkey = job_key(job_id);
        let ttl_secs = ttl.as_secs() as i64;
        redis::pipe()
            .atomic()
            .hset(&rkey, "assigned_job_id", job_id.get())
            .expire(&rkey, ttl_secs)
            .hset_multiple(
                &jkey,
                &[
                    ("runner_id".to_string(), runner_id.get().to_string()),
                    ("user_id".to_string(), user_id.get().to_string()),
                    ("progress".to_string(), "0".to_string()),
                    ("abort".to_string(), "0".to_string()),
                ],
            )
            .expire(&jkey, ttl_secs)
            .publish(
                DomainEvent::channel_name(user_id),
                serde_json::to_string(&DomainEvent::new(user_id, job_id, EventKind::JobUpdated))
                    .unwrap_or_default(),
            )
            .query_async::<()>(&mut conn)
            .await?;
        Ok(Some(runner_id))
    }

    async fn get_in_process_job(&self, job_id: JobId) -> CacheResult<Option<InProcessJob>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(job_key(job_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::hash_to_in_process_job(&fields)?))
    }

    async fn finalize_job(&self, runner: &OnlineRunner, job_id: JobId) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let jkey = job_key(job_id);
        let rkey = runner_key(runner.id);
        let user_id: Option<i64> = conn.hget(&jkey, "user_id").await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(&jkey)
            .hdel(&rkey, &["in_process", "assigned_job_id"])
            .zrem(JOB_QUEUE_SORTED_SET, job_id.get())
            .zadd(RUNNER_SORTED_SET, runner.id.get(), runner.priority as f64);
        if let Some(user_id) = user_id {
            pipe.publish(
                DomainEvent::channel_name(UserId::new(user_id)),
                serde_json::to_string(&DomainEvent::new(
                    UserId::new(user_id),
                    job_id,
                    EventKind::JobUpdated,
                ))
                .unwrap_or_default(),
            );
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn abort_in_process_job(&self, job_id: JobId) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let jkey = job_key(job_id);
        let user_id: Option<i64> = conn.hget(&jkey, "user_id").await?;
        let Some(user_id) = user_id else {
            return Err(CacheError::inconsistent(format!("{jkey} had no user_id")));
        };
        redis::pipe()
            .atomic()
            .hset(&jkey, "abort", "1")
            .publish(
                DomainEvent::channel_name(UserId::new(user_id)),
                serde_json::to_string(&DomainEvent::new(
                    UserId::new(user_id),
                    job_id,
                    EventKind::JobUpdated,
                ))
                .unwrap_or_default(),
            )
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn report_progress_if_changed(
        &self,
        job_id: JobId,
        progress: f64,
    ) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let jkey = job_key(job_id);
        let current: Option<String> = conn.hget(&jkey, "progress").await?;
        let current: f64 = current.and_then(|v| v.parse().ok()).unwrap_or(f64::NAN);
        if current == progress {
            return Ok(false);
        }
        let user_id: Option<i64> = conn.hget(&jkey, "user_id").await?;
        redis::pipe()
            .atomic()
            .hset(&jkey, "progress", progress.to_string())
            .query_async::<()>(&mut conn)
            .await?;
        if let Some(user_id) = user_id {
            conn.publish::<_, _, ()>(
                DomainEvent::channel_name(UserId::new(user_id)),
                serde_json::to_string(&DomainEvent::new(
                    UserId::new(user_id),
                    job_id,
                    EventKind::JobUpdated,
                ))
                .unwrap_or_default(),
            )
            .await?;
        }
        Ok(true)
    }

    async fn subscribe(&self, user_id: UserId) -> CacheResult<EventStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub
            .subscribe(DomainEvent::channel_name(user_id))
            .await?;
        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str::<DomainEvent>(&payload).ok()
        });
        Ok(Box::pin(stream) as BoxStream<'static, DomainEvent>)
    }

    async fn publish(&self, event: DomainEvent) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(
            DomainEvent::channel_name(event.user_id),
            serde_json::to_string(&event).unwrap_or_default(),
        )
        .await?;
        Ok(())
    }
}
