//! SQLite store for turns, summaries, notifications and grow state.
//!
//! Uses a single SQLite database file with five tables:
//! - `chat_turns` — the per-owner turn log
//! - `chat_summaries` — rolling conversation summaries
//! - `notifications` — delivered alerts
//! - `grows` — grow records, stored as JSON alongside indexed columns
//! - `grow_snapshots` — sensor readings per grow
//!
//! Timestamps are written as fixed-width RFC 3339 strings so that text
//! ordering matches time ordering. The integer `iid` breaks ties.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use canopy_core::error::{GrowStateError, NotifyError, StoreError};
use canopy_core::grow::{Grow, GrowStateProvider, Snapshot};
use canopy_core::message::{ConversationSummary, ConversationTurn, Role};
use canopy_core::notify::{Notification, NotificationSink};
use canopy_core::store::{SortOrder, TurnQuery, TurnStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A SQLite-backed implementation of every persistence collaborator.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("Bad timestamp '{s}': {e}")))
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // A single connection keeps `:memory:` databases coherent across queries
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements: [(&str, &str); 8] = [
            (
                "chat_turns table",
                r#"
                CREATE TABLE IF NOT EXISTS chat_turns (
                    iid         INTEGER PRIMARY KEY AUTOINCREMENT,
                    id          TEXT UNIQUE NOT NULL,
                    owner_id    TEXT NOT NULL,
                    role        TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    tags        TEXT NOT NULL DEFAULT '{}',
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "chat_turns index",
                "CREATE INDEX IF NOT EXISTS idx_chat_turns_owner ON chat_turns(owner_id, created_at)",
            ),
            (
                "chat_summaries table",
                r#"
                CREATE TABLE IF NOT EXISTS chat_summaries (
                    iid                INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_id           TEXT NOT NULL,
                    summary_text       TEXT NOT NULL,
                    folded_turn_count  INTEGER NOT NULL DEFAULT 0,
                    created_at         TEXT NOT NULL
                )
                "#,
            ),
            (
                "notifications table",
                r#"
                CREATE TABLE IF NOT EXISTS notifications (
                    iid         INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_id    TEXT NOT NULL,
                    title       TEXT NOT NULL,
                    body        TEXT NOT NULL,
                    data        TEXT NOT NULL DEFAULT '{}',
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "grows table",
                r#"
                CREATE TABLE IF NOT EXISTS grows (
                    id          TEXT PRIMARY KEY,
                    owner_id    TEXT NOT NULL,
                    status      TEXT NOT NULL,
                    data        TEXT NOT NULL,
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "grows index",
                "CREATE INDEX IF NOT EXISTS idx_grows_owner ON grows(owner_id, status, created_at)",
            ),
            (
                "grow_snapshots table",
                r#"
                CREATE TABLE IF NOT EXISTS grow_snapshots (
                    iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                    grow_id      TEXT NOT NULL,
                    recorded_at  TEXT NOT NULL,
                    temperature  REAL,
                    humidity     REAL,
                    ph           REAL,
                    ec           REAL,
                    vpd          REAL
                )
                "#,
            ),
            (
                "grow_snapshots index",
                "CREATE INDEX IF NOT EXISTS idx_grow_snapshots_grow ON grow_snapshots(grow_id, recorded_at DESC)",
            ),
        ];

        for (label, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{label}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationTurn, StoreError> {
        let get = |col: &str| -> Result<String, StoreError> {
            row.try_get(col)
                .map_err(|e| StoreError::QueryFailed(format!("{col} column: {e}")))
        };

        let role_str = get("role")?;
        let role = Role::parse(&role_str)
            .ok_or_else(|| StoreError::QueryFailed(format!("Unknown role '{role_str}'")))?;
        let tags = serde_json::from_str(&get("tags")?).unwrap_or_default();

        Ok(ConversationTurn {
            id: get("id")?,
            owner_id: get("owner_id")?,
            role,
            content: get("content")?,
            tags,
            created_at: parse_timestamp(&get("created_at")?)?,
        })
    }

    /// Insert or replace a grow record.
    pub async fn upsert_grow(&self, grow: &Grow) -> Result<(), StoreError> {
        let data = serde_json::to_string(grow)
            .map_err(|e| StoreError::Storage(format!("Grow serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO grows (id, owner_id, status, data, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                status = excluded.status,
                data = excluded.data,
                created_at = excluded.created_at
            "#,
        )
        .bind(&grow.id)
        .bind(&grow.owner_id)
        .bind(grow.status.as_str())
        .bind(&data)
        .bind(timestamp(&grow.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Grow upsert failed: {e}")))?;

        debug!(grow_id = %grow.id, "Stored grow");
        Ok(())
    }

    pub async fn record_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO grow_snapshots (grow_id, recorded_at, temperature, humidity, ph, ec, vpd)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&snapshot.grow_id)
        .bind(timestamp(&snapshot.recorded_at))
        .bind(snapshot.temperature)
        .bind(snapshot.humidity)
        .bind(snapshot.ph)
        .bind(snapshot.ec)
        .bind(snapshot.vpd)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Snapshot insert failed: {e}")))?;
        Ok(())
    }

    /// Notifications for an owner, oldest first.
    pub async fn notifications(&self, owner_id: &str) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM notifications WHERE owner_id = ?1 ORDER BY created_at, iid",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Notification listing: {e}")))?;

        rows.iter()
            .map(|row| {
                let get = |col: &str| -> Result<String, StoreError> {
                    row.try_get(col)
                        .map_err(|e| StoreError::QueryFailed(format!("{col} column: {e}")))
                };
                Ok(Notification {
                    owner_id: get("owner_id")?,
                    title: get("title")?,
                    body: get("body")?,
                    data: serde_json::from_str(&get("data")?).unwrap_or_default(),
                    created_at: parse_timestamp(&get("created_at")?)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl TurnStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append_turn(&self, mut turn: ConversationTurn) -> Result<String, StoreError> {
        if turn.id.is_empty() {
            turn.id = Uuid::new_v4().to_string();
        }
        let tags = serde_json::to_string(&turn.tags)
            .map_err(|e| StoreError::Storage(format!("Tags serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO chat_turns (id, owner_id, role, content, tags, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&turn.id)
        .bind(&turn.owner_id)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(&tags)
        .bind(timestamp(&turn.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT failed: {e}")))?;

        debug!(turn_id = %turn.id, owner_id = %turn.owner_id, "Stored turn");
        Ok(turn.id)
    }

    async fn list_turns(
        &self,
        owner_id: &str,
        query: TurnQuery,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let order = match query.order {
            SortOrder::OldestFirst => "created_at ASC, iid ASC",
            SortOrder::NewestFirst => "created_at DESC, iid DESC",
        };
        // SQLite treats a negative LIMIT as unbounded
        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);
        let sql =
            format!("SELECT * FROM chat_turns WHERE owner_id = ?1 ORDER BY {order} LIMIT ?2 OFFSET ?3");

        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .bind(limit)
            .bind(query.offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Turn listing: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn count_turns(&self, owner_id: &str) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM chat_turns WHERE owner_id = ?1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(cnt as usize)
    }

    async fn delete_turns(&self, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!("DELETE FROM chat_turns WHERE id IN ({})", placeholders.join(", "));

        let mut db_query = sqlx::query(&sql);
        for id in ids {
            db_query = db_query.bind(id);
        }

        let result = db_query
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE failed: {e}")))?;
        Ok(result.rows_affected() as usize)
    }

    async fn latest_summary(
        &self,
        owner_id: &str,
    ) -> Result<Option<ConversationSummary>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM chat_summaries WHERE owner_id = ?1 ORDER BY created_at DESC, iid DESC LIMIT 1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Summary lookup: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let summary_text: String = row
            .try_get("summary_text")
            .map_err(|e| StoreError::QueryFailed(format!("summary_text column: {e}")))?;
        let folded: i64 = row.try_get("folded_turn_count").unwrap_or(0);
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(Some(ConversationSummary {
            owner_id: owner_id.to_string(),
            summary_text,
            folded_turn_count: folded.max(0) as usize,
            created_at: parse_timestamp(&created_at)?,
        }))
    }

    async fn put_summary(&self, summary: ConversationSummary) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO chat_summaries (owner_id, summary_text, folded_turn_count, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&summary.owner_id)
        .bind(&summary.summary_text)
        .bind(summary.folded_turn_count as i64)
        .bind(timestamp(&summary.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Summary insert failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for SqliteStore {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let failed = |reason: String| NotifyError::DeliveryFailed {
            owner_id: notification.owner_id.clone(),
            reason,
        };
        let data = serde_json::to_string(&notification.data).map_err(|e| failed(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO notifications (owner_id, title, body, data, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&notification.owner_id)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&data)
        .bind(timestamp(&notification.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| failed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl GrowStateProvider for SqliteStore {
    async fn get_grow(
        &self,
        owner_id: &str,
        grow_id: Option<&str>,
    ) -> Result<Option<Grow>, GrowStateError> {
        let row = match grow_id {
            Some(id) => {
                sqlx::query("SELECT id, data FROM grows WHERE owner_id = ?1 AND id = ?2")
                    .bind(owner_id)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, data FROM grows
                    WHERE owner_id = ?1 AND status = 'active'
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#,
                )
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(|e| GrowStateError::LookupFailed(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row
            .try_get("id")
            .map_err(|e| GrowStateError::LookupFailed(format!("id column: {e}")))?;
        let data: String = row
            .try_get("data")
            .map_err(|e| GrowStateError::LookupFailed(format!("data column: {e}")))?;

        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| GrowStateError::Malformed {
                grow_id: id,
                reason: e.to_string(),
            })
    }

    async fn recent_snapshots(
        &self,
        grow_id: &str,
        limit: usize,
    ) -> Result<Vec<Snapshot>, GrowStateError> {
        let rows = sqlx::query(
            "SELECT * FROM grow_snapshots WHERE grow_id = ?1 ORDER BY recorded_at DESC, iid DESC LIMIT ?2",
        )
        .bind(grow_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GrowStateError::LookupFailed(format!("Snapshot listing: {e}")))?;

        rows.iter()
            .map(|row| {
                let recorded_at: String = row
                    .try_get("recorded_at")
                    .map_err(|e| GrowStateError::LookupFailed(format!("recorded_at column: {e}")))?;
                Ok(Snapshot {
                    grow_id: grow_id.to_string(),
                    recorded_at: parse_timestamp(&recorded_at)
                        .map_err(|e| GrowStateError::LookupFailed(e.to_string()))?,
                    temperature: row.try_get("temperature").ok().flatten(),
                    humidity: row.try_get("humidity").ok().flatten(),
                    ph: row.try_get("ph").ok().flatten(),
                    ec: row.try_get("ec").ok().flatten(),
                    vpd: row.try_get("vpd").ok().flatten(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::grow::GrowStatus;
    use chrono::Duration;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn grow(id: &str, owner: &str, status: GrowStatus, age_days: i64) -> Grow {
        Grow {
            id: id.into(),
            owner_id: owner.into(),
            name: format!("Grow {id}"),
            strain_name: Some("Northern Lights".into()),
            medium: Some("soil".into()),
            current_phase: Some("vegetative".into()),
            start_date: None,
            light_type: None,
            light_wattage: Some(240),
            space_cm: Some([80.0, 80.0, 160.0]),
            status,
            plan: None,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[tokio::test]
    async fn turns_round_trip_in_order() {
        let store = test_store().await;
        let first = ConversationTurn::new("grower", Role::User, "leaves are yellow")
            .with_tag("intent", "question");
        let created_at = first.created_at;
        let mut second = ConversationTurn::new("grower", Role::Assistant, "check nitrogen");
        // Equal timestamps fall back to insertion order
        second.created_at = created_at;

        store.append_turn(first).await.unwrap();
        store.append_turn(second).await.unwrap();

        let turns = store.list_turns("grower", TurnQuery::all()).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].tags["intent"], "question");
        assert_eq!(turns[1].content, "check nitrogen");

        let newest = store.list_turns("grower", TurnQuery::newest(1)).await.unwrap();
        assert_eq!(newest[0].content, "check nitrogen");
    }

    #[tokio::test]
    async fn corrupt_timestamp_is_a_query_error() {
        let store = test_store().await;
        sqlx::query(
            "INSERT INTO chat_turns (id, owner_id, role, content, created_at) \
             VALUES ('t1', 'grower', 'user', 'hi', 'yesterday-ish')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store.list_turns("grower", TurnQuery::all()).await.unwrap_err();
        assert!(matches!(err, StoreError::QueryFailed(ref m) if m.contains("yesterday-ish")));
    }

    #[tokio::test]
    async fn paging_and_counting() {
        let store = test_store().await;
        for i in 0..5 {
            store
                .append_turn(ConversationTurn::new("grower", Role::User, format!("m{i}")))
                .await
                .unwrap();
        }
        assert_eq!(store.count_turns("grower").await.unwrap(), 5);
        assert_eq!(store.count_turns("other").await.unwrap(), 0);

        let page = store.list_turns("grower", TurnQuery::page(2, 2)).await.unwrap();
        let contents: Vec<_> = page.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3"]);
    }

    #[tokio::test]
    async fn delete_turns_by_id() {
        let store = test_store().await;
        let a = store
            .append_turn(ConversationTurn::new("grower", Role::User, "a"))
            .await
            .unwrap();
        store
            .append_turn(ConversationTurn::new("grower", Role::User, "b"))
            .await
            .unwrap();

        assert_eq!(store.delete_turns(&[]).await.unwrap(), 0);
        assert_eq!(store.delete_turns(&[a, "missing".into()]).await.unwrap(), 1);
        let left = store.list_turns("grower", TurnQuery::all()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].content, "b");
    }

    #[tokio::test]
    async fn latest_summary_is_returned() {
        let store = test_store().await;
        assert!(store.latest_summary("grower").await.unwrap().is_none());

        store
            .put_summary(ConversationSummary::new("grower", "first", 4))
            .await
            .unwrap();
        store
            .put_summary(ConversationSummary::new("grower", "second", 6))
            .await
            .unwrap();

        let latest = store.latest_summary("grower").await.unwrap().unwrap();
        assert_eq!(latest.summary_text, "second");
        assert_eq!(latest.folded_turn_count, 6);
    }

    #[tokio::test]
    async fn notifications_are_persisted() {
        let store = test_store().await;
        store
            .notify(Notification::new(
                "grower",
                "Emergency",
                "body",
                serde_json::json!({"type": "emergency_chat"}),
            ))
            .await
            .unwrap();

        let sent = store.notifications("grower").await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data["type"], "emergency_chat");
    }

    #[tokio::test]
    async fn grow_lookup_defaults_to_newest_active() {
        let store = test_store().await;
        store.upsert_grow(&grow("old", "o", GrowStatus::Active, 20)).await.unwrap();
        store.upsert_grow(&grow("new", "o", GrowStatus::Active, 2)).await.unwrap();
        store.upsert_grow(&grow("done", "o", GrowStatus::Completed, 0)).await.unwrap();

        let found = store.get_grow("o", None).await.unwrap().unwrap();
        assert_eq!(found.id, "new");
        assert_eq!(found.space_cm, Some([80.0, 80.0, 160.0]));

        let explicit = store.get_grow("o", Some("done")).await.unwrap().unwrap();
        assert_eq!(explicit.status, GrowStatus::Completed);
        assert!(store.get_grow("someone-else", Some("old")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshots_newest_first() {
        let store = test_store().await;
        for (minutes_ago, temp) in [(30, 21.0), (10, 23.0), (20, 22.0)] {
            store
                .record_snapshot(&Snapshot {
                    grow_id: "g1".into(),
                    recorded_at: Utc::now() - Duration::minutes(minutes_ago),
                    temperature: Some(temp),
                    humidity: Some(55.0),
                    ph: None,
                    ec: None,
                    vpd: None,
                })
                .await
                .unwrap();
        }

        let recent = store.recent_snapshots("g1", 2).await.unwrap();
        let temps: Vec<_> = recent.iter().map(|s| s.temperature.unwrap()).collect();
        assert_eq!(temps, vec![23.0, 22.0]);
        assert!(recent[0].ph.is_none());
    }
}
