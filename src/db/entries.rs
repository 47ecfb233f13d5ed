//! Queue entry operations: atomic enqueue with dedupe, lease, ack, and
//! orphan sweep.
//!
//! All expiry arithmetic uses the database clock (`now()`) so clients with
//! skewed clocks agree on when a lease or record has expired.

use crate::error::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Parameters for one enqueue.
#[derive(Debug)]
pub struct NewEntry<'a> {
    pub namespace: &'a str,
    pub priority: i32,
    pub payload: &'a [u8],
    /// Set when dedupe is enabled.
    pub fingerprint: Option<&'a [u8]>,
    pub update_priority_on_duplicate: bool,
    pub item_ttl: Option<Duration>,
    pub dedupe_ttl: Option<Duration>,
}

/// Result of an enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new ready entry was written.
    Enqueued { entry_id: i64 },
    /// The fingerprint was already recorded; nothing was written.
    Duplicate,
    /// The fingerprint was already recorded and the ready entry was re-ranked.
    PriorityUpdated { entries: u64 },
}

/// A row just moved from ready to leased.
#[derive(Debug, Clone)]
pub struct LeasedEntry {
    pub entry_id: i64,
    pub priority: i32,
    pub payload: Vec<u8>,
    pub attempts: u32,
    pub lease_expires_at: DateTime<Utc>,
}

/// An expired lease dropped for exceeding the retry limit.
#[derive(Debug, Clone)]
pub struct DroppedEntry {
    pub entry_id: i64,
    pub payload: Vec<u8>,
    pub attempts: u32,
}

/// What one sweep did.
#[derive(Debug, Clone, Default)]
pub struct Sweep {
    /// (entry id, attempts) returned to ready.
    pub requeued: Vec<(i64, u32)>,
    pub dropped: Vec<DroppedEntry>,
    pub expired_items: u64,
    pub expired_fingerprints: u64,
}

fn ttl_ms(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

impl super::Db {
    /// Enqueue an entry. With a fingerprint, the dedupe check and the write
    /// happen in one transaction; the unique key on the fingerprint table
    /// arbitrates between racing producers.
    pub async fn enqueue_entry(&self, new: NewEntry<'_>) -> Result<EnqueueOutcome> {
        let mut tx = self.pool().begin().await?;

        if let Some(fingerprint) = new.fingerprint {
            // A record past its TTL no longer counts as seen.
            sqlx::query(
                "DELETE FROM dispatch_fingerprints
                 WHERE namespace = $1 AND fingerprint = $2
                 AND expires_at IS NOT NULL AND expires_at <= now()",
            )
            .bind(new.namespace)
            .bind(fingerprint)
            .execute(&mut *tx)
            .await?;

            let recorded: Option<(Vec<u8>,)> = sqlx::query_as(
                "INSERT INTO dispatch_fingerprints (namespace, fingerprint, expires_at)
                 VALUES ($1, $2, CASE WHEN $3::bigint IS NULL THEN NULL
                                      ELSE now() + $3::bigint * interval '1 millisecond' END)
                 ON CONFLICT (namespace, fingerprint) DO NOTHING
                 RETURNING fingerprint",
            )
            .bind(new.namespace)
            .bind(fingerprint)
            .bind(ttl_ms(new.dedupe_ttl))
            .fetch_optional(&mut *tx)
            .await?;

            if recorded.is_none() {
                if new.update_priority_on_duplicate {
                    let entries = sqlx::query(
                        "UPDATE dispatch_entries SET priority = $3
                         WHERE namespace = $1 AND fingerprint = $2 AND state = 'ready'",
                    )
                    .bind(new.namespace)
                    .bind(fingerprint)
                    .bind(new.priority)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();

                    tx.commit().await?;
                    if entries > 0 {
                        return Ok(EnqueueOutcome::PriorityUpdated { entries });
                    }
                    return Ok(EnqueueOutcome::Duplicate);
                }

                tx.commit().await?;
                return Ok(EnqueueOutcome::Duplicate);
            }
        }

        let (entry_id,): (i64,) = sqlx::query_as(
            "INSERT INTO dispatch_entries (namespace, priority, fingerprint, payload, expires_at)
             VALUES ($1, $2, $3, $4, CASE WHEN $5::bigint IS NULL THEN NULL
                                          ELSE now() + $5::bigint * interval '1 millisecond' END)
             RETURNING id",
        )
        .bind(new.namespace)
        .bind(new.priority)
        .bind(new.fingerprint)
        .bind(new.payload)
        .bind(ttl_ms(new.item_ttl))
        .fetch_one(&mut *tx)
        .await?;

        // NOTIFY is transactional: only fires on commit
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(super::READY_CHANNEL)
            .bind(new.namespace)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(EnqueueOutcome::Enqueued { entry_id })
    }

    /// Atomically move the best-ranked ready entry to leased.
    ///
    /// `SKIP LOCKED` lets concurrent consumers pass over a row another
    /// consumer is claiming, so no two callers receive the same entry.
    pub async fn lease_entry(
        &self,
        namespace: &str,
        holder: Uuid,
        lease_timeout: Duration,
    ) -> Result<Option<LeasedEntry>> {
        let row: Option<(i64, i32, Vec<u8>, i32, DateTime<Utc>)> = sqlx::query_as(
            "WITH selected AS (
                 SELECT id FROM dispatch_entries
                 WHERE namespace = $1
                   AND state = 'ready'
                   AND (expires_at IS NULL OR expires_at > now())
                 ORDER BY priority ASC, id ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             UPDATE dispatch_entries SET
                 state = 'leased',
                 holder = $2,
                 lease_expires_at = now() + $3::bigint * interval '1 millisecond',
                 attempts = attempts + 1
             WHERE id = (SELECT id FROM selected)
             RETURNING id, priority, payload, attempts, lease_expires_at",
        )
        .bind(namespace)
        .bind(holder)
        .bind(ttl_ms(Some(lease_timeout)))
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(
            |(entry_id, priority, payload, attempts, lease_expires_at)| LeasedEntry {
                entry_id,
                priority,
                payload,
                attempts: attempts.max(0) as u32,
                lease_expires_at,
            },
        ))
    }

    /// Delete a leased entry held by `holder`. Returns false if the lease
    /// is gone (expired and reclaimed, or never held).
    pub async fn ack_entry(&self, namespace: &str, entry_id: i64, holder: Uuid) -> Result<bool> {
        let rows = sqlx::query(
            "DELETE FROM dispatch_entries
             WHERE namespace = $1 AND id = $2 AND holder = $3 AND state = 'leased'",
        )
        .bind(namespace)
        .bind(entry_id)
        .bind(holder)
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Reconcile expired leases and purge expired items and fingerprints.
    ///
    /// Expired leases whose attempt count reached `max_orphan_retries` are
    /// deleted and returned; the rest go back to ready with their attempt
    /// count intact.
    pub async fn sweep_orphans(&self, namespace: &str, max_orphan_retries: u32) -> Result<Sweep> {
        let max = i32::try_from(max_orphan_retries).unwrap_or(i32::MAX);
        let mut tx = self.pool().begin().await?;

        let dropped: Vec<(i64, Vec<u8>, i32)> = sqlx::query_as(
            "DELETE FROM dispatch_entries
             WHERE namespace = $1 AND state = 'leased'
               AND lease_expires_at <= now() AND attempts >= $2
             RETURNING id, payload, attempts",
        )
        .bind(namespace)
        .bind(max)
        .fetch_all(&mut *tx)
        .await?;

        let requeued: Vec<(i64, i32)> = sqlx::query_as(
            "UPDATE dispatch_entries SET state = 'ready', holder = NULL, lease_expires_at = NULL
             WHERE namespace = $1 AND state = 'leased'
               AND lease_expires_at <= now() AND attempts < $2
             RETURNING id, attempts",
        )
        .bind(namespace)
        .bind(max)
        .fetch_all(&mut *tx)
        .await?;

        let expired_items = sqlx::query(
            "DELETE FROM dispatch_entries
             WHERE namespace = $1 AND state = 'ready'
               AND expires_at IS NOT NULL AND expires_at <= now()",
        )
        .bind(namespace)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let expired_fingerprints = sqlx::query(
            "DELETE FROM dispatch_fingerprints
             WHERE namespace = $1 AND expires_at IS NOT NULL AND expires_at <= now()",
        )
        .bind(namespace)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if !requeued.is_empty() {
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(super::READY_CHANNEL)
                .bind(namespace)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(Sweep {
            requeued: requeued
                .into_iter()
                .map(|(id, attempts)| (id, attempts.max(0) as u32))
                .collect(),
            dropped: dropped
                .into_iter()
                .map(|(entry_id, payload, attempts)| DroppedEntry {
                    entry_id,
                    payload,
                    attempts: attempts.max(0) as u32,
                })
                .collect(),
            expired_items,
            expired_fingerprints,
        })
    }

    /// Count ready, unexpired entries. Leased entries are excluded.
    pub async fn count_ready(&self, namespace: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM dispatch_entries
             WHERE namespace = $1 AND state = 'ready'
               AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(namespace)
        .fetch_one(self.pool())
        .await?;
        Ok(count.max(0) as u64)
    }

    /// Count leased entries (in flight, not yet acknowledged).
    pub async fn count_leased(&self, namespace: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM dispatch_entries WHERE namespace = $1 AND state = 'leased'",
        )
        .bind(namespace)
        .fetch_one(self.pool())
        .await?;
        Ok(count.max(0) as u64)
    }

    /// Delete every entry and fingerprint in `namespace`. Other namespaces are untouched.
    pub async fn clear_namespace(&self, namespace: &str) -> Result<u64> {
        let mut tx = self.pool().begin().await?;
        let entries = sqlx::query("DELETE FROM dispatch_entries WHERE namespace = $1")
            .bind(namespace)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM dispatch_fingerprints WHERE namespace = $1")
            .bind(namespace)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_rendered_in_millis() {
        assert_eq!(ttl_ms(None), None);
        assert_eq!(ttl_ms(Some(Duration::from_secs(3))), Some(3_000));
        assert_eq!(ttl_ms(Some(Duration::MAX)), Some(i64::MAX));
    }
}
