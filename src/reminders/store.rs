//! 提醒存储：持久化的提醒队列
//!
//! 记录只有两种状态 pending → sent，且永不删除。调度器只插入，投递 Worker 只做 pending→sent。
//! remind_at 以 UTC 偏移的 ISO-8601 文本存储（固定格式，保证字符串比较即时间比较）。
//! (title, remind_at) 唯一：同一天重复运行流水线不会重复插入同一条提醒。

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::core::StoreError;

/// 提醒状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Pending,
    Sent,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Sent => "sent",
        }
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReminderStatus::Pending),
            "sent" => Ok(ReminderStatus::Sent),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// 持久化的提醒记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: i64,
    pub title: String,
    pub remind_at: DateTime<Utc>,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
}

/// 待插入的提醒
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReminder {
    pub title: String,
    pub remind_at: DateTime<Utc>,
}

/// 插入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(ReminderRecord),
    /// 已存在相同 (title, remind_at) 的记录，未插入
    Duplicate,
}

/// 提醒存储接口；每个操作只涉及单条记录，无跨记录事务
#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn insert(&self, reminder: NewReminder, now: DateTime<Utc>) -> Result<InsertOutcome, StoreError>;

    /// status = pending 且 remind_at <= now，按 remind_at 升序
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRecord>, StoreError>;

    /// pending → sent；记录不存在或已是 sent 时返回 false
    async fn mark_sent(&self, id: i64) -> Result<bool, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<ReminderRecord>, StoreError>;

    async fn list(&self) -> Result<Vec<ReminderRecord>, StoreError>;
}

/// 存储格式：2026-10-18T07:00:00+00:00
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, false)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidTimestamp(format!("{raw}: {e}")))
}

/// SQLite 实现
pub struct SqliteReminderStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteReminderStore {
    /// 打开（或创建）数据库文件；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                remind_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'sent')),
                created_at TEXT NOT NULL,
                UNIQUE (title, remind_at)
            );
            CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders(status, remind_at);",
        )?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }
}

type RawRow = (i64, String, String, String, String);

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_record((id, title, remind_at, status, created_at): RawRow) -> Result<ReminderRecord, StoreError> {
    Ok(ReminderRecord {
        id,
        title,
        remind_at: parse_timestamp(&remind_at)?,
        status: status.parse()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

const SELECT_COLUMNS: &str = "SELECT id, title, remind_at, status, created_at FROM reminders";

#[async_trait]
impl ReminderStore for SqliteReminderStore {
    async fn insert(&self, reminder: NewReminder, now: DateTime<Utc>) -> Result<InsertOutcome, StoreError> {
        let db = self.db.lock().await;
        let changed = db.execute(
            "INSERT OR IGNORE INTO reminders (title, remind_at, status, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                reminder.title,
                format_timestamp(reminder.remind_at),
                ReminderStatus::Pending.as_str(),
                format_timestamp(now)
            ],
        )?;
        if changed == 0 {
            return Ok(InsertOutcome::Duplicate);
        }
        Ok(InsertOutcome::Inserted(ReminderRecord {
            id: db.last_insert_rowid(),
            title: reminder.title,
            remind_at: reminder.remind_at,
            status: ReminderStatus::Pending,
            // 与存储精度一致（秒）
            created_at: parse_timestamp(&format_timestamp(now))?,
        }))
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRecord>, StoreError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "{SELECT_COLUMNS} WHERE status = ?1 AND remind_at <= ?2 ORDER BY remind_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(
            params![ReminderStatus::Pending.as_str(), format_timestamp(now)],
            read_raw,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(into_record(row?)?);
        }
        Ok(results)
    }

    async fn mark_sent(&self, id: i64) -> Result<bool, StoreError> {
        let db = self.db.lock().await;
        let changed = db.execute(
            "UPDATE reminders SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![
                ReminderStatus::Sent.as_str(),
                id,
                ReminderStatus::Pending.as_str()
            ],
        )?;
        Ok(changed > 0)
    }

    async fn get(&self, id: i64) -> Result<Option<ReminderRecord>, StoreError> {
        let db = self.db.lock().await;
        let raw = db
            .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], read_raw)
            .optional()?;
        raw.map(into_record).transpose()
    }

    async fn list(&self) -> Result<Vec<ReminderRecord>, StoreError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!("{SELECT_COLUMNS} ORDER BY id ASC"))?;
        let rows = stmt.query_map([], read_raw)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(into_record(row?)?);
        }
        Ok(results)
    }
}

/// 内存实现（离线演练与测试）
#[derive(Default)]
pub struct InMemoryReminderStore {
    records: RwLock<Vec<ReminderRecord>>,
}

impl InMemoryReminderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReminderStore for InMemoryReminderStore {
    async fn insert(&self, reminder: NewReminder, now: DateTime<Utc>) -> Result<InsertOutcome, StoreError> {
        let mut records = self.records.write().await;
        if records
            .iter()
            .any(|r| r.title == reminder.title && r.remind_at == reminder.remind_at)
        {
            return Ok(InsertOutcome::Duplicate);
        }
        let record = ReminderRecord {
            id: records.len() as i64 + 1,
            title: reminder.title,
            remind_at: reminder.remind_at,
            status: ReminderStatus::Pending,
            created_at: now,
        };
        records.push(record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRecord>, StoreError> {
        let records = self.records.read().await;
        let mut due: Vec<_> = records
            .iter()
            .filter(|r| r.status == ReminderStatus::Pending && r.remind_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|r| (r.remind_at, r.id));
        Ok(due)
    }

    async fn mark_sent(&self, id: i64) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        match records
            .iter_mut()
            .find(|r| r.id == id && r.status == ReminderStatus::Pending)
        {
            Some(record) => {
                record.status = ReminderStatus::Sent;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: i64) -> Result<Option<ReminderRecord>, StoreError> {
        Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<ReminderRecord>, StoreError> {
        Ok(self.records.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, h, m, 0).unwrap()
    }

    fn new(title: &str, remind_at: DateTime<Utc>) -> NewReminder {
        NewReminder {
            title: title.to_string(),
            remind_at,
        }
    }

    async fn exercise(store: &dyn ReminderStore) {
        let now = at(6, 0);
        let InsertOutcome::Inserted(a) = store.insert(new("Reminder: A", at(7, 0)), now).await.unwrap() else {
            panic!("expected insert");
        };
        store.insert(new("Reminder: B", at(9, 0)), now).await.unwrap();
        assert_eq!(a.status, ReminderStatus::Pending);

        // 重复插入被忽略
        assert_eq!(
            store.insert(new("Reminder: A", at(7, 0)), now).await.unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(store.list().await.unwrap().len(), 2);

        assert!(store.due(at(6, 59)).await.unwrap().is_empty());
        let due = store.due(at(7, 0)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].title, "Reminder: A");

        assert!(store.mark_sent(a.id).await.unwrap());
        assert!(!store.mark_sent(a.id).await.unwrap(), "sent is terminal");
        assert!(store.due(at(12, 0)).await.unwrap().iter().all(|r| r.title == "Reminder: B"));

        let fetched = store.get(a.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ReminderStatus::Sent);
        assert_eq!(fetched.remind_at, at(7, 0));
        assert!(store.get(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_store_lifecycle() {
        let store = SqliteReminderStore::open_in_memory().unwrap();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = InMemoryReminderStore::new();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/reminders.db");
        {
            let store = SqliteReminderStore::open(&path).unwrap();
            store.insert(new("Reminder: Persist", at(10, 0)), at(8, 0)).await.unwrap();
        }
        let store = SqliteReminderStore::open(&path).unwrap();
        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Reminder: Persist");
        assert_eq!(all[0].created_at, at(8, 0));
    }

    #[tokio::test]
    async fn test_wire_format() {
        let store = SqliteReminderStore::open_in_memory().unwrap();
        store
            .insert(new("Reminder: Wire", at(7, 0)), at(6, 0))
            .await
            .unwrap();
        let db = store.db.lock().await;
        let (remind_at, status): (String, String) = db
            .query_row("SELECT remind_at, status FROM reminders", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(remind_at, "2026-10-18T07:00:00+00:00");
        assert_eq!(status, "pending");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("sent".parse::<ReminderStatus>().unwrap(), ReminderStatus::Sent);
        assert!("cancelled".parse::<ReminderStatus>().is_err());
    }
}
