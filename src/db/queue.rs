use rusqlite::params;

use super::*;
use crate::util::{new_id, truncate};

/// Stored error messages are capped so one pathological failure can't bloat
/// the queue table.
const ERROR_MESSAGE_MAX: usize = 500;

impl TalentDb {
    // =========================================================================
    // Enrichment queue
    // =========================================================================

    /// Enqueue a person for enrichment. A person already waiting (pending or
    /// leased) is not enqueued twice; a higher incoming priority upgrades the
    /// waiting item instead. Returns true when a new item was created.
    pub fn enqueue_enrichment(&self, person_id: &str, priority: i64) -> Result<bool, DbError> {
        let existing: Option<(String, i64)> = {
            let mut stmt = self.conn.prepare(
                "SELECT queue_id, priority FROM enrichment_queue
                 WHERE person_id = ?1 AND status IN ('pending', 'in_progress')
                 LIMIT 1",
            )?;
            let mut rows = stmt.query_map(params![person_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            match rows.next() {
                Some(row) => Some(row?),
                None => None,
            }
        };

        if let Some((queue_id, existing_priority)) = existing {
            if priority > existing_priority {
                self.conn.execute(
                    "UPDATE enrichment_queue SET priority = ?2 WHERE queue_id = ?1",
                    params![queue_id, priority],
                )?;
            }
            return Ok(false);
        }

        // Queue timestamps use SQL-side datetime('now') so the lease-TTL and
        // FIFO comparisons below stay within one format.
        self.conn.execute(
            "INSERT INTO enrichment_queue (queue_id, person_id, priority, status, created_at)
             VALUES (?1, ?2, ?3, 'pending', datetime('now'))",
            params![new_id(), person_id, priority],
        )?;
        Ok(true)
    }

    /// Lease the next batch of pending items, highest priority first then
    /// FIFO. The select and the pending→in_progress flip happen in one
    /// transaction, so a queue_id has exactly one owner at a time.
    pub fn lease_enrichment_batch(&self, batch_size: i64) -> Result<Vec<QueueLease>, DbError> {
        self.with_transaction(|db| {
            let leases = {
                let mut stmt = db.conn.prepare(
                    "SELECT q.queue_id, q.person_id, p.full_name, p.linkedin_url,
                            q.priority, q.attempts
                     FROM enrichment_queue q
                     JOIN person p ON p.person_id = q.person_id
                     WHERE q.status = 'pending'
                     ORDER BY q.priority DESC, q.created_at ASC, q.rowid ASC
                     LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![batch_size], |row| {
                    Ok(QueueLease {
                        queue_id: row.get(0)?,
                        person_id: row.get(1)?,
                        full_name: row.get(2)?,
                        linkedin_url: row.get(3)?,
                        priority: row.get(4)?,
                        attempts: row.get(5)?,
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            for lease in &leases {
                db.conn.execute(
                    "UPDATE enrichment_queue
                     SET status = 'in_progress', last_attempt = datetime('now'),
                         attempts = attempts + 1
                     WHERE queue_id = ?1",
                    params![lease.queue_id],
                )?;
            }

            Ok(leases)
        })
    }

    pub fn mark_enrichment_completed(&self, queue_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE enrichment_queue
             SET status = 'completed', completed_at = datetime('now')
             WHERE queue_id = ?1",
            params![queue_id],
        )?;
        Ok(())
    }

    /// Terminal failure. No automatic retry; an operator sweep may
    /// re-enqueue after inspection.
    pub fn mark_enrichment_failed(&self, queue_id: &str, error: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE enrichment_queue
             SET status = 'failed', error_message = ?2
             WHERE queue_id = ?1",
            params![queue_id, truncate(error, ERROR_MESSAGE_MAX)],
        )?;
        Ok(())
    }

    /// Return leases whose worker went away: `in_progress` items older than
    /// the TTL revert to `pending`. Returns the number reaped.
    pub fn reap_stale_leases(&self, ttl_minutes: i64) -> Result<usize, DbError> {
        let reaped = self.conn.execute(
            "UPDATE enrichment_queue
             SET status = 'pending'
             WHERE status = 'in_progress'
               AND last_attempt < datetime('now', '-' || ?1 || ' minutes')",
            params![ttl_minutes],
        )?;
        Ok(reaped)
    }

    /// Drop queue items for a person that is about to be deleted by the
    /// merge engine, so no foreign key outlives the row.
    pub fn delete_queue_items_for_person(&self, person_id: &str) -> Result<usize, DbError> {
        let deleted = self.conn.execute(
            "DELETE FROM enrichment_queue WHERE person_id = ?1",
            params![person_id],
        )?;
        Ok(deleted)
    }

    pub fn queue_counts(&self) -> Result<QueueCounts, DbError> {
        let mut counts = QueueCounts::default();
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM enrichment_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "pending" => counts.pending = count,
                "in_progress" => counts.in_progress = count,
                "completed" => counts.completed = count,
                "failed" => counts.failed = count,
                _ => {}
            }
        }
        Ok(counts)
    }
}
