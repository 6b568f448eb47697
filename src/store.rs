//! SQLite-backed session source and label resolver.
//!
//! Timestamps are stored as unix seconds plus a nanosecond part, so a stored
//! session clips exactly like the in-memory one. The store never deduplicates
//! sessions; overlapping rows are returned as recorded.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{ReportWindow, Session};

/// Minimum Jaro-Winkler similarity for a fuzzy group-name match.
const GROUP_MATCH_THRESHOLD: f64 = 0.85;

pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened session store");
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entities (
                entity_id BLOB PRIMARY KEY,
                label     TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS groups (
                group_id BLOB PRIMARY KEY,
                name     TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS group_members (
                group_id  BLOB NOT NULL REFERENCES groups(group_id),
                entity_id BLOB NOT NULL REFERENCES entities(entity_id),
                PRIMARY KEY (group_id, entity_id)
            );
            CREATE TABLE IF NOT EXISTS sessions (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id BLOB NOT NULL,
                logon_secs   INTEGER NOT NULL,
                logon_nanos  INTEGER NOT NULL,
                logoff_secs  INTEGER NOT NULL,
                logoff_nanos INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_entity ON sessions(entity_id, logon_secs);",
        )?;
        Ok(())
    }

    /// Inserts or renames an entity.
    pub fn upsert_entity(&self, entity_id: Uuid, label: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO entities (entity_id, label) VALUES (?1, ?2)
             ON CONFLICT(entity_id) DO UPDATE SET label = excluded.label",
            params![entity_id, label],
        )?;
        Ok(())
    }

    pub fn create_group(&self, name: &str) -> StoreResult<Uuid> {
        let group_id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO groups (group_id, name) VALUES (?1, ?2)",
            params![group_id, name],
        )?;
        info!(%group_id, name, "created group");
        Ok(group_id)
    }

    pub fn add_member(&self, group_id: Uuid, entity_id: Uuid) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO group_members (group_id, entity_id) VALUES (?1, ?2)",
            params![group_id, entity_id],
        )?;
        Ok(())
    }

    pub fn record_session(&self, session: &Session) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO sessions (entity_id, logon_secs, logon_nanos, logoff_secs, logoff_nanos)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.entity_id,
                session.start.timestamp(),
                session.start.timestamp_subsec_nanos(),
                session.end.timestamp(),
                session.end.timestamp_subsec_nanos()
            ],
        )?;
        Ok(())
    }

    /// Sessions of `entities` that intersect `window`.
    ///
    /// Repeated ids are queried once, so each session is returned at most once.
    pub fn sessions_between(&self, entities: &[Uuid], window: &ReportWindow) -> StoreResult<Vec<Session>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT logon_secs, logon_nanos, logoff_secs, logoff_nanos FROM sessions
             WHERE entity_id = ?1
               AND (logon_secs, logon_nanos) < (?4, ?5)
               AND (logoff_secs, logoff_nanos) > (?2, ?3)
             ORDER BY logon_secs, logon_nanos",
        )?;

        let mut seen = HashSet::with_capacity(entities.len());
        let mut sessions = Vec::new();
        for entity_id in entities.iter().filter(|id| seen.insert(**id)) {
            let rows = stmt
                .query_map(
                    params![
                        entity_id,
                        window.begin.timestamp(),
                        window.begin.timestamp_subsec_nanos(),
                        window.end.timestamp(),
                        window.end.timestamp_subsec_nanos()
                    ],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, u32>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, u32>(3)?,
                        ))
                    },
                )?
                .collect::<Result<Vec<_>, _>>()?;
            for (on_secs, on_nanos, off_secs, off_nanos) in rows {
                sessions.push(Session::new(
                    *entity_id,
                    from_parts(on_secs, on_nanos)?,
                    from_parts(off_secs, off_nanos)?,
                ));
            }
        }

        debug!(entities = entities.len(), sessions = sessions.len(), "loaded sessions");
        Ok(sessions)
    }

    /// Labels for the known subset of `entities`.
    pub fn labels(&self, entities: &[Uuid]) -> StoreResult<HashMap<Uuid, String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT label FROM entities WHERE entity_id = ?1")?;
        let mut labels = HashMap::with_capacity(entities.len());
        for entity_id in entities {
            let label: Option<String> = stmt
                .query_row(params![entity_id], |row| row.get(0))
                .optional()?;
            if let Some(label) = label {
                labels.insert(*entity_id, label);
            }
        }
        Ok(labels)
    }

    pub fn group_members(&self, group_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT entity_id FROM group_members WHERE group_id = ?1")?;
        let members = stmt
            .query_map(params![group_id], |row| row.get(0))?
            .collect::<Result<Vec<Uuid>, _>>()?;
        Ok(members)
    }

    /// Resolves a group by name: exact (case-insensitive) first, then the
    /// closest name by Jaro-Winkler similarity.
    pub fn find_group(&self, name: &str) -> StoreResult<(Uuid, String)> {
        let mut stmt = self.conn.prepare_cached("SELECT group_id, name FROM groups")?;
        let groups = stmt
            .query_map([], |row| Ok((row.get::<_, Uuid>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let wanted = name.to_lowercase();
        if let Some(exact) = groups.iter().find(|(_, n)| n.to_lowercase() == wanted) {
            return Ok(exact.clone());
        }

        groups
            .into_iter()
            .map(|(id, n)| {
                let score = strsim::jaro_winkler(&wanted, &n.to_lowercase());
                (score, id, n)
            })
            .filter(|(score, _, _)| *score >= GROUP_MATCH_THRESHOLD)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(score, id, n)| {
                debug!(query = name, matched = %n, score, "fuzzy group match");
                (id, n)
            })
            .ok_or_else(|| StoreError::GroupNotFound(name.to_string()))
    }
}

fn from_parts(secs: i64, nanos: u32) -> StoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, nanos).ok_or(StoreError::Timestamp { secs, nanos })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_sessions_between_returns_overlapping_only() {
        let store = SessionStore::open_in_memory().unwrap();
        let player = Uuid::from_u128(1);
        store.upsert_entity(player, "Salted").unwrap();
        store.record_session(&Session::new(player, at(0, 0), at(0, 30))).unwrap();
        store.record_session(&Session::new(player, at(1, 50), at(2, 10))).unwrap();
        store.record_session(&Session::new(player, at(3, 0), at(4, 0))).unwrap();

        let window = ReportWindow::new(at(0, 15), at(2, 0)).unwrap();
        let sessions = store.sessions_between(&[player], &window).unwrap();

        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].start, at(0, 0));
        assert_eq!(sessions[1].end, at(2, 10));
    }

    #[test]
    fn test_sessions_between_queries_repeated_ids_once() {
        let store = SessionStore::open_in_memory().unwrap();
        let player = Uuid::from_u128(1);
        store.upsert_entity(player, "Salted").unwrap();
        store.record_session(&Session::new(player, at(0, 0), at(0, 30))).unwrap();

        let window = ReportWindow::new(at(0, 0), at(1, 0)).unwrap();
        let sessions = store.sessions_between(&[player, player], &window).unwrap();
        assert_eq!(sessions.len(), 1);

        let labels = store.labels(&[player]).unwrap();
        let options = crate::models::ReportOptions::default();
        let page = crate::pipeline::ReportPipeline::run_with_options(
            &[player, player],
            &sessions,
            &window,
            &labels,
            &options,
            1,
        )
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].total_active_seconds(), 1800);
    }

    #[test]
    fn test_sub_millisecond_precision_round_trips() {
        let store = SessionStore::open_in_memory().unwrap();
        let player = Uuid::from_u128(1);
        let start = at(0, 0) + chrono::Duration::nanoseconds(1_234_567);
        let end = at(0, 10) + chrono::Duration::nanoseconds(999_999_999);
        let session = Session::new(player, start, end);
        store.record_session(&session).unwrap();

        let window = ReportWindow::new(start, at(0, 5)).unwrap();
        let loaded = store.sessions_between(&[player], &window).unwrap();
        assert_eq!(loaded, vec![session.clone()]);
        assert_eq!(
            crate::projections::clip(&loaded[0], &window),
            crate::projections::clip(&session, &window)
        );

        let after = ReportWindow::new(end, end + chrono::Duration::minutes(1)).unwrap();
        assert!(store.sessions_between(&[player], &after).unwrap().is_empty());
    }

    #[test]
    fn test_labels_skip_unknown_entities() {
        let store = SessionStore::open_in_memory().unwrap();
        let known = Uuid::from_u128(1);
        store.upsert_entity(known, "Salted").unwrap();
        store.upsert_entity(known, "Salted2").unwrap();

        let labels = store.labels(&[known, Uuid::from_u128(2)]).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[&known], "Salted2");
    }

    #[test]
    fn test_group_members() {
        let store = SessionStore::open_in_memory().unwrap();
        let group = store.create_group("Avicia").unwrap();
        for n in 1..=3 {
            let id = Uuid::from_u128(n);
            store.upsert_entity(id, &format!("p{n}")).unwrap();
            store.add_member(group, id).unwrap();
        }
        store.add_member(group, Uuid::from_u128(1)).unwrap();

        assert_eq!(store.group_members(group).unwrap().len(), 3);
    }

    #[test]
    fn test_find_group_exact_and_fuzzy() {
        let store = SessionStore::open_in_memory().unwrap();
        let avicia = store.create_group("Avicia").unwrap();
        store.create_group("Empire of Sindria").unwrap();

        assert_eq!(store.find_group("avicia").unwrap().0, avicia);
        assert_eq!(store.find_group("Avicai").unwrap().0, avicia);
        assert!(matches!(
            store.find_group("Nerfuria"),
            Err(StoreError::GroupNotFound(_))
        ));
    }

    #[test]
    fn test_open_on_disk_persists() {
        let file = NamedTempFile::new().unwrap();
        let player = Uuid::from_u128(5);
        {
            let store = SessionStore::open(file.path()).unwrap();
            store.upsert_entity(player, "Helm").unwrap();
        }
        let store = SessionStore::open(file.path()).unwrap();
        assert_eq!(store.labels(&[player]).unwrap()[&player], "Helm");
    }
}
