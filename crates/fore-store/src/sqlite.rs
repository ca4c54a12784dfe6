use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use fore_core::{NewPost, Post, PostId, PostStatus};
use rusqlite::{types::Type, types::Value, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::{
    db::init_db,
    error::{Result, StoreError},
    store::{PostPatch, PostStore},
};

const POST_COLUMNS: &str = "id, content, media, platform, scheduled_time, status, external_id,
     last_error, attempt_count, claimed_at, created_at, updated_at";

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// [`PostStore`] backed by a single SQLite connection.
///
/// Several `SqlitePostStore`s (in one process or many) may point at the same
/// file; the claim and terminal updates stay single-winner because each is
/// one conditional `UPDATE`.
pub struct SqlitePostStore {
    conn: Mutex<Connection>,
}

impl SqlitePostStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open (or create) a database file in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn query_posts<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Post>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, post_from_row)?;

        let mut posts = Vec::new();
        for row in rows {
            match row {
                Ok(post) => posts.push(post),
                // A single corrupt row must not hide every other due post.
                Err(e @ rusqlite::Error::FromSqlConversionFailure(..)) => {
                    warn!("skipping unreadable post row: {e}");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(posts)
    }
}

impl PostStore for SqlitePostStore {
    fn find_due(&self, now: DateTime<Utc>, window: Duration) -> Result<Vec<Post>> {
        let horizon = ts(now + window);
        self.query_posts(
            &format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE status = 'scheduled' AND scheduled_time <= ?1
                 ORDER BY scheduled_time"
            ),
            [&horizon],
        )
    }

    fn try_claim(&self, id: &PostId, expected: PostStatus) -> Result<bool> {
        let conn = self.conn()?;
        let now = ts(Utc::now());
        let n = conn.execute(
            "UPDATE posts SET status = 'posting', claimed_at = ?1, updated_at = ?1
             WHERE id = ?2 AND status = ?3",
            rusqlite::params![now, id.as_str(), expected.as_str()],
        )?;
        if n == 1 {
            debug!(post_id = %id, from = %expected, "post claimed");
        }
        Ok(n == 1)
    }

    fn update(&self, id: &PostId, patch: &PostPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = patch.status {
            sets.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(ref external_id) = patch.external_id {
            sets.push("external_id = ?");
            values.push(nullable(external_id));
        }
        if let Some(ref last_error) = patch.last_error {
            sets.push("last_error = ?");
            values.push(nullable(last_error));
        }
        if patch.bump_attempt {
            sets.push("attempt_count = attempt_count + 1");
        }
        sets.push("updated_at = ?");
        values.push(Value::Text(ts(Utc::now())));

        let mut sql = format!("UPDATE posts SET {} WHERE id = ?", sets.join(", "));
        values.push(Value::Text(id.as_str().to_string()));
        if let Some(expected) = patch.expect_status {
            sql.push_str(" AND status = ?");
            values.push(Value::Text(expected.as_str().to_string()));
        }

        let conn = self.conn()?;
        let n = conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        if n > 0 {
            return Ok(());
        }

        let exists = conn
            .query_row("SELECT 1 FROM posts WHERE id = ?1", [id.as_str()], |_| Ok(()))
            .optional()?
            .is_some();
        match (exists, patch.expect_status) {
            (true, Some(expected)) => Err(StoreError::StateConflict {
                id: id.clone(),
                expected,
            }),
            _ => Err(StoreError::PostNotFound { id: id.clone() }),
        }
    }

    fn get(&self, id: &PostId) -> Result<Option<Post>> {
        let conn = self.conn()?;
        let post = conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                [id.as_str()],
                post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    fn insert(&self, new: NewPost) -> Result<Post> {
        let conn = self.conn()?;
        let now = Utc::now().trunc_subsecs(3);
        let post = Post {
            id: PostId::new(),
            content: new.content,
            media: new.media,
            platform: new.platform,
            scheduled_time: new.scheduled_time.trunc_subsecs(3),
            status: new.status,
            external_id: None,
            last_error: None,
            attempt_count: 0,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO posts
             (id, content, media, platform, scheduled_time, status, external_id,
              last_error, attempt_count, claimed_at, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,NULL,NULL,0,NULL,?7,?7)",
            rusqlite::params![
                post.id.as_str(),
                post.content,
                post.media,
                post.platform,
                ts(post.scheduled_time),
                post.status.as_str(),
                ts(now),
            ],
        )?;
        info!(post_id = %post.id, platform = %post.platform, status = %post.status, "post stored");
        Ok(post)
    }

    fn list(&self) -> Result<Vec<Post>> {
        self.query_posts(
            &format!("SELECT {POST_COLUMNS} FROM posts ORDER BY scheduled_time"),
            [],
        )
    }

    fn scheduled_times(&self, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT scheduled_time FROM posts
             WHERE status IN ('scheduled', 'posting') AND scheduled_time >= ?1
             ORDER BY scheduled_time",
        )?;
        let times = stmt
            .query_map([ts(since)], |row| parse_ts(0, row.get::<_, String>(0)?))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(times)
    }

    fn find_stale_claims(&self, claimed_before: DateTime<Utc>) -> Result<Vec<Post>> {
        self.query_posts(
            &format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE status = 'posting' AND claimed_at IS NOT NULL AND claimed_at < ?1
                 ORDER BY claimed_at"
            ),
            [ts(claimed_before)],
        )
    }
}

// --- row mapping -----------------------------------------------------------

/// RFC 3339 UTC with millisecond precision, so lexical order equals time order.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn nullable(v: &Option<String>) -> Value {
    match v {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

fn parse_ts(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_ts(idx: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(idx, s)).transpose()
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    let status_str: String = row.get(5)?;
    let status: PostStatus = status_str.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into())
    })?;

    Ok(Post {
        id: PostId(row.get(0)?),
        content: row.get(1)?,
        media: row.get(2)?,
        platform: row.get(3)?,
        scheduled_time: parse_ts(4, row.get(4)?)?,
        status,
        external_id: row.get(6)?,
        last_error: row.get(7)?,
        attempt_count: row.get(8)?,
        claimed_at: parse_opt_ts(9, row.get(9)?)?,
        created_at: parse_ts(10, row.get(10)?)?,
        updated_at: parse_ts(11, row.get(11)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    fn due_post(store: &SqlitePostStore, offset_secs: i64) -> Post {
        store
            .insert(NewPost::scheduled(
                "hello world",
                "x",
                Utc::now() + Duration::seconds(offset_secs),
            ))
            .unwrap()
    }

    #[test]
    fn insert_then_get_returns_same_post() {
        let store = SqlitePostStore::open_in_memory().unwrap();
        let post = store
            .insert(NewPost::scheduled("hi", "x", Utc::now()).with_media("cat.png"))
            .unwrap();
        let loaded = store.get(&post.id).unwrap().expect("post should exist");
        assert_eq!(loaded, post);
        assert_eq!(loaded.attempt_count, 0);
        assert!(loaded.external_id.is_none());
    }

    #[test]
    fn find_due_respects_forward_window() {
        let store = SqlitePostStore::open_in_memory().unwrap();
        let past = due_post(&store, -30);
        let soon = due_post(&store, 30);
        let later = due_post(&store, 3600);

        let due = store.find_due(Utc::now(), Duration::seconds(60)).unwrap();
        let ids: Vec<_> = due.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![past.id, soon.id]);
        assert!(!ids.contains(&later.id));
    }

    #[test]
    fn find_due_ignores_drafts_and_terminal_posts() {
        let store = SqlitePostStore::open_in_memory().unwrap();
        store
            .insert(NewPost::scheduled("draft", "x", Utc::now()).with_status(PostStatus::Draft))
            .unwrap();
        store
            .insert(NewPost::scheduled("done", "x", Utc::now()).with_status(PostStatus::Posted))
            .unwrap();
        assert!(store.find_due(Utc::now(), Duration::zero()).unwrap().is_empty());
    }

    #[test]
    fn claim_succeeds_once() {
        let store = SqlitePostStore::open_in_memory().unwrap();
        let post = due_post(&store, -1);

        assert!(store.try_claim(&post.id, PostStatus::Scheduled).unwrap());
        assert!(!store.try_claim(&post.id, PostStatus::Scheduled).unwrap());

        let loaded = store.get(&post.id).unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Posting);
        assert!(loaded.claimed_at.is_some());
        // claimed posts are no longer due
        assert!(store.find_due(Utc::now(), Duration::seconds(60)).unwrap().is_empty());
    }

    #[test]
    fn claim_of_unknown_post_is_false_not_error() {
        let store = SqlitePostStore::open_in_memory().unwrap();
        assert!(!store
            .try_claim(&PostId::from("missing"), PostStatus::Scheduled)
            .unwrap());
    }

    #[test]
    fn concurrent_claims_across_connections_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fore.db");
        let post = {
            let store = SqlitePostStore::open(&path).unwrap();
            due_post(&store, -5)
        };

        const CONTENDERS: usize = 8;
        let barrier = Arc::new(Barrier::new(CONTENDERS));
        let handles: Vec<_> = (0..CONTENDERS)
            .map(|_| {
                let path = path.clone();
                let id = post.id.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    // separate connection per thread, like separate poller processes
                    let store = SqlitePostStore::open(&path).unwrap();
                    barrier.wait();
                    store.try_claim(&id, PostStatus::Scheduled).unwrap()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn terminal_update_requires_posting_state() {
        let store = SqlitePostStore::open_in_memory().unwrap();
        let post = due_post(&store, -1);

        let err = store.update(&post.id, &PostPatch::posted("ext-1")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::StateConflict { expected: PostStatus::Posting, .. }
        ));

        assert!(store.try_claim(&post.id, PostStatus::Scheduled).unwrap());
        store.update(&post.id, &PostPatch::attempt()).unwrap();
        store.update(&post.id, &PostPatch::posted("ext-1")).unwrap();

        let loaded = store.get(&post.id).unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Posted);
        assert_eq!(loaded.external_id.as_deref(), Some("ext-1"));
        assert_eq!(loaded.attempt_count, 1);
        assert!(loaded.last_error.is_none());

        // a second terminal write loses
        assert!(store.update(&post.id, &PostPatch::failed("late")).is_err());
    }

    #[test]
    fn attempt_count_increments_in_place() {
        let store = SqlitePostStore::open_in_memory().unwrap();
        let post = due_post(&store, -1);
        assert!(store.try_claim(&post.id, PostStatus::Scheduled).unwrap());

        for _ in 0..3 {
            store.update(&post.id, &PostPatch::attempt()).unwrap();
        }
        assert_eq!(store.get(&post.id).unwrap().unwrap().attempt_count, 3);

        // not claimed any more: the bump is refused and the count stays put
        store.update(&post.id, &PostPatch::failed("x")).unwrap();
        assert!(store.update(&post.id, &PostPatch::attempt()).is_err());
        assert_eq!(store.get(&post.id).unwrap().unwrap().attempt_count, 3);
    }

    #[test]
    fn update_of_unknown_post_is_not_found() {
        let store = SqlitePostStore::open_in_memory().unwrap();
        let err = store
            .update(&PostId::from("nope"), &PostPatch::failed("x"))
            .unwrap_err();
        assert!(matches!(err, StoreError::PostNotFound { .. }));
    }

    #[test]
    fn stale_claims_are_listed() {
        let store = SqlitePostStore::open_in_memory().unwrap();
        let post = due_post(&store, -1);
        assert!(store.try_claim(&post.id, PostStatus::Scheduled).unwrap());

        assert!(store
            .find_stale_claims(Utc::now() - Duration::minutes(10))
            .unwrap()
            .is_empty());
        let stale = store
            .find_stale_claims(Utc::now() + Duration::seconds(1))
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, post.id);
    }

    #[test]
    fn scheduled_times_skip_finished_posts() {
        let store = SqlitePostStore::open_in_memory().unwrap();
        let start = Utc::now();
        let waiting = due_post(&store, 600);
        store
            .insert(
                NewPost::scheduled("gone", "x", start + Duration::seconds(900))
                    .with_status(PostStatus::Failed),
            )
            .unwrap();

        let times = store.scheduled_times(start).unwrap();
        assert_eq!(times, vec![waiting.scheduled_time]);
    }
}
