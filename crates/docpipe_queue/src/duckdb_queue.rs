//! DuckDB-backed [`JobQueue`] (§4.A).

use crate::error::QueueError;
use crate::queue::{CountsByKind, JobQueue};
use async_trait::async_trait;
use docpipe_protocol::{EnqueueOptions, Job, JobId, JobState};
use duckdb::{params, Connection};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct DuckDbJobQueue {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbJobQueue {
    pub fn open(path: &Path) -> Result<Self, QueueError> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, QueueError>
    where
        F: FnOnce(&Connection) -> Result<T, QueueError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("duckdb connection mutex poisoned");
            f(&guard)
        })
        .await?
    }
}

fn init_schema(conn: &Connection) -> Result<(), QueueError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            kind VARCHAR NOT NULL,
            payload_json VARCHAR NOT NULL,
            state VARCHAR NOT NULL,
            priority INTEGER NOT NULL,
            retry_count INTEGER NOT NULL,
            retry_limit INTEGER NOT NULL,
            retry_delay_secs BIGINT NOT NULL,
            retry_backoff BOOLEAN NOT NULL,
            start_after TIMESTAMP NOT NULL,
            expire_in_secs BIGINT NOT NULL,
            singleton_key VARCHAR,
            created_on TIMESTAMP NOT NULL,
            started_on TIMESTAMP,
            completed_on TIMESTAMP,
            output_json VARCHAR
        );
        ",
    )?;
    Ok(())
}

fn row_to_job(row: &duckdb::Row) -> duckdb::Result<Job> {
    let id: String = row.get("id")?;
    let kind: String = row.get("kind")?;
    let payload_json: String = row.get("payload_json")?;
    let state: String = row.get("state")?;
    let priority: i32 = row.get("priority")?;
    let retry_count: i32 = row.get("retry_count")?;
    let retry_limit: i32 = row.get("retry_limit")?;
    let retry_delay_secs: i64 = row.get("retry_delay_secs")?;
    let retry_backoff: bool = row.get("retry_backoff")?;
    let start_after: chrono::DateTime<chrono::Utc> = row.get("start_after")?;
    let expire_in_secs: i64 = row.get("expire_in_secs")?;
    let singleton_key: Option<String> = row.get("singleton_key")?;
    let created_on: chrono::DateTime<chrono::Utc> = row.get("created_on")?;
    let started_on: Option<chrono::DateTime<chrono::Utc>> = row.get("started_on")?;
    let completed_on: Option<chrono::DateTime<chrono::Utc>> = row.get("completed_on")?;
    let output_json: Option<String> = row.get("output_json")?;

    Ok(Job {
        id: JobId::from_str(&id).expect("stored job id is a valid uuid"),
        kind,
        payload: serde_json::from_str(&payload_json).unwrap_or(serde_json::Value::Null),
        state: parse_state(&state),
        priority,
        retry_count: retry_count as u32,
        retry_limit: retry_limit as u32,
        retry_delay: Duration::from_secs(retry_delay_secs as u64),
        retry_backoff,
        start_after,
        expire_in: Duration::from_secs(expire_in_secs as u64),
        singleton_key,
        created_on,
        started_on,
        completed_on,
        output: output_json
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .unwrap_or(None),
    })
}

fn parse_state(s: &str) -> JobState {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .expect("stored job state is one of the closed enum variants")
}

#[async_trait]
impl JobQueue for DuckDbJobQueue {
    async fn enqueue(
        &self,
        kind: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId, QueueError> {
        let kind = kind.to_string();
        self.with_conn(move |conn| {
            if let Some(key) = &options.singleton_key {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT id FROM jobs WHERE kind = ? AND singleton_key = ?
                         AND state IN ('created', 'retry', 'active') LIMIT 1",
                        params![kind, key],
                        |row| row.get(0),
                    )
                    .ok();
                if let Some(existing_id) = existing {
                    return Ok(JobId::from_str(&existing_id).expect("stored job id is valid"));
                }
            }

            let id = JobId::new();
            let now = chrono::Utc::now();
            let start_after = now + chrono::Duration::from_std(options.delay).unwrap_or_default();
            conn.execute(
                "INSERT INTO jobs (id, kind, payload_json, state, priority, retry_count, retry_limit,
                 retry_delay_secs, retry_backoff, start_after, expire_in_secs, singleton_key, created_on)
                 VALUES (?, ?, ?, 'created', ?, 0, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id.to_string(),
                    kind,
                    serde_json::to_string(&payload)?,
                    options.priority,
                    options.retry_limit,
                    options.retry_delay.as_secs() as i64,
                    options.retry_backoff,
                    start_after,
                    options.expire_in.as_secs() as i64,
                    options.singleton_key,
                    now,
                ],
            )?;
            Ok(id)
        })
        .await
    }

    async fn dequeue(&self, kind: &str, batch_size: usize) -> Result<Vec<Job>, QueueError> {
        let kind = kind.to_string();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let now = chrono::Utc::now();
            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM jobs WHERE kind = ? AND state IN ('created', 'retry')
                     AND start_after <= ? ORDER BY priority DESC, created_on ASC LIMIT ?",
                )?;
                let rows = stmt.query_map(params![kind, now, batch_size as i64], |row| {
                    row.get::<_, String>(0)
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            let mut jobs = Vec::with_capacity(ids.len());
            for id in &ids {
                tx.execute(
                    "UPDATE jobs SET state = 'active', started_on = ? WHERE id = ?",
                    params![now, id],
                )?;
                let job = tx.query_row("SELECT * FROM jobs WHERE id = ?", params![id], row_to_job)?;
                jobs.push(job);
            }
            tx.commit()?;
            Ok(jobs)
        })
        .await
    }

    async fn complete(&self, job_id: JobId, output: serde_json::Value) -> Result<(), QueueError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE jobs SET state = 'completed', completed_on = ?, output_json = ? WHERE id = ?",
                params![chrono::Utc::now(), serde_json::to_string(&output)?, job_id.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    async fn fail(&self, job_id: JobId, error: &str) -> Result<(), QueueError> {
        let error = error.to_string();
        self.with_conn(move |conn| {
            let job = conn.query_row(
                "SELECT * FROM jobs WHERE id = ?",
                params![job_id.to_string()],
                row_to_job,
            )?;
            if job.retry_count < job.retry_limit {
                let next_retry_count = job.retry_count + 1;
                let delay = job.next_retry_delay();
                let start_after = chrono::Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_default();
                conn.execute(
                    "UPDATE jobs SET state = 'retry', retry_count = ?, start_after = ?, output_json = ? WHERE id = ?",
                    params![
                        next_retry_count,
                        start_after,
                        serde_json::json!({ "error": error }).to_string(),
                        job_id.to_string()
                    ],
                )?;
            } else {
                conn.execute(
                    "UPDATE jobs SET state = 'failed', completed_on = ?, output_json = ? WHERE id = ?",
                    params![
                        chrono::Utc::now(),
                        serde_json::json!({ "error": error }).to_string(),
                        job_id.to_string()
                    ],
                )?;
            }
            Ok(())
        })
        .await
    }

    async fn force_fail(&self, job_id: JobId, error: &str) -> Result<(), QueueError> {
        let error = error.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE jobs SET state = 'failed', completed_on = ?, output_json = ? WHERE id = ?",
                params![
                    chrono::Utc::now(),
                    serde_json::json!({ "error": error }).to_string(),
                    job_id.to_string()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get(&self, job_id: JobId) -> Result<Job, QueueError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT * FROM jobs WHERE id = ?",
                params![job_id.to_string()],
                row_to_job,
            )
            .map_err(|_| QueueError::JobNotFound(job_id))
        })
        .await
    }

    async fn cancel(&self, job_id: JobId) -> Result<(), QueueError> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE jobs SET state = 'cancelled' WHERE id = ? AND state = 'created'",
                params![job_id.to_string()],
            )?;
            if updated == 0 {
                return Err(QueueError::NotCancellable(job_id));
            }
            Ok(())
        })
        .await
    }

    async fn counts(&self) -> Result<CountsByKind, QueueError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT kind, state, COUNT(*) FROM jobs GROUP BY kind, state")?;
            let rows = stmt.query_map([], |row| {
                let kind: String = row.get(0)?;
                let state: String = row.get(1)?;
                let count: i64 = row.get(2)?;
                Ok((kind, state, count))
            })?;
            let mut counts: CountsByKind = CountsByKind::new();
            for row in rows {
                let (kind, state, count) = row?;
                counts
                    .entry(kind)
                    .or_default()
                    .insert(parse_state(&state), count as u64);
            }
            Ok(counts)
        })
        .await
    }

    async fn list_active(&self) -> Result<Vec<Job>, QueueError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM jobs WHERE state IN ('created', 'retry', 'active', 'failed')
                 ORDER BY created_on DESC",
            )?;
            let rows = stmt.query_map([], row_to_job)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}
