use rusqlite::Connection;

use crate::error::Result;

/// Initialise the post schema in `conn`.
///
/// Creates the `posts` table (idempotent) and an index on
/// `(status, scheduled_time)` so the due-post query stays cheap.
/// Timestamps are stored as RFC 3339 UTC strings with millisecond precision,
/// which sort lexically in time order.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS posts (
            id              TEXT    NOT NULL PRIMARY KEY,
            content         TEXT    NOT NULL,
            media           TEXT,               -- opaque upload reference or NULL
            platform        TEXT    NOT NULL,
            scheduled_time  TEXT    NOT NULL,   -- RFC 3339 UTC
            status          TEXT    NOT NULL DEFAULT 'draft',
            external_id     TEXT,
            last_error      TEXT,
            attempt_count   INTEGER NOT NULL DEFAULT 0,
            claimed_at      TEXT,
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_posts_status_time
            ON posts (status, scheduled_time);
        ",
    )?;
    Ok(())
}
