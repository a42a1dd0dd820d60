//! Redis-backed document store.

use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, info, warn};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, Script};
use tokio::sync::Mutex;

use crate::document::{
    DocumentRecord, DocumentStatus, DocumentSummary, DocumentUpdate, FIELD_CREATED_AT, FIELD_STATUS,
};
use crate::error::StoreError;
use crate::store::{document_key, CasOutcome, DocumentStore, KEY_PREFIX};

/// Writes ARGV field/value pairs only when the hash already exists.
const UPDATE_IF_EXISTS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
"#;

/// ARGV[1] is the expected status, the rest are field/value pairs.
/// Returns {0, ''} when missing, {2, current} on mismatch, {1, current} when applied.
const COMPARE_AND_UPDATE: &str = r#"
local current = redis.call('HGET', KEYS[1], 'status')
if not current then
    return {0, ''}
end
if current ~= ARGV[1] then
    return {2, current}
end
redis.call('HSET', KEYS[1], unpack(ARGV, 2))
return {1, current}
"#;

const SCAN_BATCH: usize = 100;

pub struct RedisStore {
    client: Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    ttl_secs: Option<u64>,
    update_script: Script,
    cas_script: Script,
}

impl RedisStore {
    /// Creates the store without connecting; the first command opens the connection.
    pub fn new(url: &str, ttl_secs: Option<u64>) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            ttl_secs,
            update_script: Script::new(UPDATE_IF_EXISTS),
            cas_script: Script::new(COMPARE_AND_UPDATE),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Converts a Redis error, dropping the cached connection if it is broken.
    async fn fail(&self, err: RedisError) -> StoreError {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            warn!("Redis connection lost: {}", err);
            self.connection.lock().await.take();
        }
        StoreError::Redis(err)
    }

    async fn scan_keys(&self, conn: &mut MultiplexedConnection) -> Result<Vec<String>, RedisError> {
        let pattern = format!("{}*", KEY_PREFIX);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(conn)
                .await?;

            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let pong: Result<String, RedisError> = redis::cmd("PING").query_async(&mut conn).await;
        match pong {
            Ok(_) => Ok(()),
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn create(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        let key = document_key(&record.document_id);
        let fields = record.to_fields();
        let mut conn = self.connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic().hset_multiple(&key, &fields).ignore();
        if let Some(ttl) = self.ttl_secs {
            pipe.expire(&key, ttl as i64).ignore();
        }

        let written: Result<(), RedisError> = pipe.query_async(&mut conn).await;
        match written {
            Ok(()) => {
                debug!("Stored document {}", record.document_id);
                Ok(())
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn get(&self, document_id: &str) -> Result<Option<DocumentRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let fields: Result<HashMap<String, String>, RedisError> =
            conn.hgetall(document_key(document_id)).await;

        match fields {
            Ok(fields) if fields.is_empty() => Ok(None),
            Ok(fields) => DocumentRecord::from_fields(document_id, &fields).map(Some),
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn update(
        &self,
        document_id: &str,
        update: &DocumentUpdate,
    ) -> Result<bool, StoreError> {
        if update.is_empty() {
            return Ok(self.get(document_id).await?.is_some());
        }

        let mut invocation = self.update_script.key(document_key(document_id));
        for (field, value) in update.to_fields() {
            invocation.arg(field).arg(value);
        }

        let mut conn = self.connection().await?;
        let applied: Result<i64, RedisError> = invocation.invoke_async(&mut conn).await;
        match applied {
            Ok(n) => Ok(n == 1),
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn compare_and_update(
        &self,
        document_id: &str,
        expected: DocumentStatus,
        update: &DocumentUpdate,
    ) -> Result<CasOutcome, StoreError> {
        let key = document_key(document_id);
        let mut invocation = self.cas_script.key(&key);
        invocation.arg(expected.as_str());
        for (field, value) in update.to_fields() {
            invocation.arg(field).arg(value);
        }

        let mut conn = self.connection().await?;
        let reply: Result<(i64, String), RedisError> = invocation.invoke_async(&mut conn).await;
        let (code, current) = match reply {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail(e).await),
        };

        match code {
            0 => Ok(CasOutcome::NotFound),
            1 => Ok(CasOutcome::Applied),
            _ => {
                let current = current
                    .parse::<DocumentStatus>()
                    .map_err(|reason| StoreError::Corrupt { key, reason })?;
                Ok(CasOutcome::Conflict(current))
            }
        }
    }

    async fn scan_all(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        let mut conn = self.connection().await?;
        let keys = match self.scan_keys(&mut conn).await {
            Ok(keys) => keys,
            Err(e) => return Err(self.fail(e).await),
        };

        let mut documents = Vec::with_capacity(keys.len());
        for key in keys {
            let values: Result<(Option<String>, Option<String>), RedisError> = redis::cmd("HMGET")
                .arg(&key)
                .arg(FIELD_STATUS)
                .arg(FIELD_CREATED_AT)
                .query_async(&mut conn)
                .await;

            let (status, created_at) = match values {
                Ok(values) => values,
                Err(e) => return Err(self.fail(e).await),
            };

            // the key may have expired or been written partially between SCAN and HMGET
            let Some(status) = status.and_then(|s| s.parse::<DocumentStatus>().ok()) else {
                debug!("Skipping {} without a readable status", key);
                continue;
            };

            documents.push(DocumentSummary {
                document_id: key.trim_start_matches(KEY_PREFIX).to_string(),
                status,
                created_at: created_at.unwrap_or_default(),
            });
        }

        Ok(documents)
    }
}
