//! Persistence for sessions, advice and the theory pool
//!
//! SQLite, single file, no server. The pipeline only sees the
//! [`PersistenceGateway`] and [`TheoryCatalog`] traits; writes are best
//! effort and never decide the outcome of a request.

use crate::error::PersistenceError;
use crate::types::{AdviceItem, CandidateTheory, Session};
use anyhow::Context as _;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Write side used by the response assembler
pub trait PersistenceGateway: Send + Sync {
    /// Store the session record (without its advice); returns the session id
    fn create_session(&self, session: &Session) -> Result<String, PersistenceError>;

    /// Store the full advice list for a session in one unit
    fn attach_advice(&self, session_id: &str, advices: &[AdviceItem]) -> Result<(), PersistenceError>;

    fn store(&self, session: &Session) -> Result<(), PersistenceError> {
        let id = self.create_session(session)?;
        self.attach_advice(&id, &session.advices)
    }
}

/// Read side used by the theory relevance engine
pub trait TheoryCatalog: Send + Sync {
    /// Every candidate theory, in pool order
    fn candidate_theories(&self) -> Result<Vec<CandidateTheory>, PersistenceError>;
}

impl TheoryCatalog for Vec<CandidateTheory> {
    fn candidate_theories(&self) -> Result<Vec<CandidateTheory>, PersistenceError> {
        Ok(self.clone())
    }
}

/// Initialize the database with schema
pub fn init_db(path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {:?}", parent))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {:?}", path))?;
    conn.execute_batch(SCHEMA)?;

    Ok(conn)
}

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Theories: reference pool, ordered by insertion (rowid)
CREATE TABLE IF NOT EXISTS theories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    academic_field TEXT NOT NULL DEFAULT '',
    definition TEXT NOT NULL DEFAULT '',
    key_concepts TEXT NOT NULL DEFAULT '[]',          -- JSON array
    examples TEXT NOT NULL DEFAULT '[]',              -- JSON array
    practical_tips TEXT NOT NULL DEFAULT '[]',        -- JSON array
    applicable_scenarios TEXT NOT NULL DEFAULT '[]',  -- JSON array
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_theories_category ON theories(category);

-- Sessions: one per advice request
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    scene TEXT NOT NULL,
    goal TEXT NOT NULL,
    time_limit TEXT NOT NULL,
    stakes TEXT NOT NULL,
    participants INTEGER,
    relationship TEXT,
    attributes_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_scene ON sessions(scene);
CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at);

-- Advices: ranked output of a session
CREATE TABLE IF NOT EXISTS advices (
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    rank INTEGER NOT NULL,
    theory_id TEXT,
    theory_name TEXT,
    short_advice TEXT NOT NULL,
    item_json TEXT NOT NULL,
    PRIMARY KEY (session_id, rank)
);
"#;

/// Insert or update a theory; an update keeps its pool position
pub fn upsert_theory(conn: &Connection, theory: &CandidateTheory) -> Result<(), PersistenceError> {
    conn.execute(
        r#"
        INSERT INTO theories (id, name, category, academic_field, definition,
                              key_concepts, examples, practical_tips, applicable_scenarios)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            category = excluded.category,
            academic_field = excluded.academic_field,
            definition = excluded.definition,
            key_concepts = excluded.key_concepts,
            examples = excluded.examples,
            practical_tips = excluded.practical_tips,
            applicable_scenarios = excluded.applicable_scenarios
        "#,
        params![
            theory.id,
            theory.name,
            theory.category,
            theory.academic_field,
            theory.definition,
            serde_json::to_string(&theory.key_concepts)?,
            serde_json::to_string(&theory.examples)?,
            serde_json::to_string(&theory.practical_tips)?,
            serde_json::to_string(&theory.applicable_scenarios)?,
        ],
    )?;
    Ok(())
}

/// All theories in pool order
pub fn load_theories(conn: &Connection) -> Result<Vec<CandidateTheory>, PersistenceError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, name, category, academic_field, definition,
               key_concepts, examples, practical_tips, applicable_scenarios
        FROM theories
        ORDER BY rowid
        "#,
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut theories = Vec::with_capacity(rows.len());
    for (id, name, category, academic_field, definition, concepts, examples, tips, scenarios) in rows {
        theories.push(CandidateTheory {
            id,
            name,
            category,
            academic_field,
            definition,
            key_concepts: serde_json::from_str(&concepts)?,
            examples: serde_json::from_str(&examples)?,
            practical_tips: serde_json::from_str(&tips)?,
            applicable_scenarios: serde_json::from_str(&scenarios)?,
        });
    }
    Ok(theories)
}

pub fn count_theories(conn: &Connection) -> Result<i64, PersistenceError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM theories", [], |row| row.get(0))?)
}

pub fn count_sessions(conn: &Connection) -> Result<i64, PersistenceError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?)
}

/// Session counts per scene, most frequent first
pub fn sessions_by_scene(conn: &Connection) -> Result<Vec<(String, i64)>, PersistenceError> {
    let mut stmt = conn.prepare(
        "SELECT scene, COUNT(*) AS n FROM sessions GROUP BY scene ORDER BY n DESC, scene",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn insert_session(conn: &Connection, session: &Session) -> Result<(), PersistenceError> {
    let ctx = &session.context;
    conn.execute(
        r#"
        INSERT INTO sessions (id, scene, goal, time_limit, stakes, participants,
                              relationship, attributes_json, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            session.id,
            ctx.scene,
            ctx.goal,
            ctx.time_limit,
            ctx.stakes,
            ctx.participants,
            ctx.relationship,
            serde_json::to_string(&ctx.attributes)?,
            session.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn replace_advices(conn: &mut Connection, session_id: &str, advices: &[AdviceItem]) -> Result<(), PersistenceError> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM advices WHERE session_id = ?1", [session_id])?;
    for (index, item) in advices.iter().enumerate() {
        let rank = if item.selected_rank > 0 {
            item.selected_rank
        } else {
            index as u32 + 1
        };
        tx.execute(
            r#"
            INSERT INTO advices (session_id, rank, theory_id, theory_name, short_advice, item_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                session_id,
                rank,
                item.theory_id,
                item.theory_name,
                item.short_advice,
                serde_json::to_string(item)?,
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// SQLite-backed gateway shared across requests
pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::from_connection(init_db(path)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn
            .lock()
            .map_err(|_| PersistenceError::Unavailable("database lock poisoned".to_string()))
    }

    /// Run a closure against the underlying connection
    #[cfg(test)]
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, PersistenceError>,
    ) -> Result<T, PersistenceError> {
        let mut conn = self.lock()?;
        f(&mut conn)
    }
}

impl PersistenceGateway for SqliteGateway {
    fn create_session(&self, session: &Session) -> Result<String, PersistenceError> {
        let conn = self.lock()?;
        insert_session(&conn, session)?;
        Ok(session.id.clone())
    }

    fn attach_advice(&self, session_id: &str, advices: &[AdviceItem]) -> Result<(), PersistenceError> {
        let mut conn = self.lock()?;
        replace_advices(&mut conn, session_id, advices)
    }
}

impl TheoryCatalog for SqliteGateway {
    fn candidate_theories(&self) -> Result<Vec<CandidateTheory>, PersistenceError> {
        let conn = self.lock()?;
        load_theories(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::meeting_context;
    use crate::types::Context;
    use chrono::{DateTime, Utc};
    use rusqlite::OptionalExtension;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    /// Load a stored session with its advice, if present
    fn get_session(conn: &Connection, session_id: &str) -> Result<Option<Session>, PersistenceError> {
        let row = conn
            .query_row(
                r#"
                SELECT scene, goal, time_limit, stakes, participants, relationship,
                       attributes_json, created_at
                FROM sessions WHERE id = ?1
                "#,
                [session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<u32>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((scene, goal, time_limit, stakes, participants, relationship, attributes, created_at)) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare("SELECT rank, item_json FROM advices WHERE session_id = ?1 ORDER BY rank")?;
        let stored = stmt
            .query_map([session_id], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut advices = Vec::with_capacity(stored.len());
        for (rank, json) in stored {
            let mut item: AdviceItem = serde_json::from_str(&json)?;
            item.selected_rank = rank;
            advices.push(item);
        }

        let attributes: BTreeMap<String, String> = serde_json::from_str(&attributes)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(Session {
            id: session_id.to_string(),
            context: Context {
                scene,
                goal,
                time_limit,
                stakes,
                participants,
                relationship,
                attributes,
            },
            advices,
            created_at,
        }))
    }

    fn setup_test_db() -> (Connection, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let conn = init_db(&path).unwrap();
        (conn, dir)
    }

    fn theory(id: &str, category: &str) -> CandidateTheory {
        CandidateTheory {
            id: id.to_string(),
            name: format!("Theory {}", id),
            category: category.to_string(),
            academic_field: "social psychology".to_string(),
            definition: "A definition".to_string(),
            key_concepts: ["trust".to_string(), "reciprocity".to_string()].into_iter().collect(),
            examples: vec!["An example".to_string()],
            practical_tips: vec!["A tip".to_string()],
            applicable_scenarios: vec!["sales".to_string()],
        }
    }

    #[test]
    fn test_init_db() {
        let (conn, _dir) = setup_test_db();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"theories".to_string()));
        assert!(tables.contains(&"sessions".to_string()));
        assert!(tables.contains(&"advices".to_string()));
    }

    #[test]
    fn test_theories_keep_pool_order_across_updates() {
        let (conn, _dir) = setup_test_db();
        upsert_theory(&conn, &theory("b", "negotiation")).unwrap();
        upsert_theory(&conn, &theory("a", "persuasion")).unwrap();

        let mut updated = theory("b", "negotiation");
        updated.name = "Renamed".to_string();
        upsert_theory(&conn, &updated).unwrap();

        let pool = load_theories(&conn).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[0].id, "b");
        assert_eq!(pool[0].name, "Renamed");
        assert_eq!(pool[1].id, "a");
        assert!(pool[0].key_concepts.contains("reciprocity"));
        assert_eq!(count_theories(&conn).unwrap(), 2);
    }

    #[test]
    fn test_session_round_trip() {
        let (conn, _dir) = setup_test_db();
        let gateway = SqliteGateway::from_connection(conn);

        let mut context = meeting_context();
        context.participants = Some(4);
        context.attributes.insert("meeting_type".into(), "kickoff".into());
        let advices = vec![
            AdviceItem {
                short_advice: "First".into(),
                selected_rank: 1,
                ..Default::default()
            },
            AdviceItem {
                short_advice: "Second".into(),
                selected_rank: 2,
                ..Default::default()
            },
        ];
        let session = Session::new(context.clone(), advices);

        gateway.store(&session).unwrap();

        let loaded = gateway
            .with_conn(|conn| get_session(conn, &session.id))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.context, context);
        assert_eq!(loaded.advices.len(), 2);
        assert_eq!(loaded.advices[1].short_advice, "Second");
        assert_eq!(loaded.advices[1].selected_rank, 2);
        assert_eq!(gateway.with_conn(|conn| count_sessions(conn)).unwrap(), 1);
    }

    #[test]
    fn test_attach_without_session_fails() {
        let (conn, _dir) = setup_test_db();
        let gateway = SqliteGateway::from_connection(conn);
        let result = gateway.attach_advice(
            "missing",
            &[AdviceItem {
                short_advice: "x".into(),
                ..Default::default()
            }],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_session_is_rejected() {
        let (conn, _dir) = setup_test_db();
        let gateway = SqliteGateway::from_connection(conn);
        let session = Session::new(meeting_context(), vec![]);
        gateway.create_session(&session).unwrap();
        assert!(gateway.create_session(&session).is_err());
    }

    #[test]
    fn test_sessions_by_scene() {
        let (conn, _dir) = setup_test_db();
        let gateway = SqliteGateway::from_connection(conn);
        for scene in ["meeting", "sales", "meeting"] {
            let mut context = meeting_context();
            context.scene = scene.to_string();
            gateway.create_session(&Session::new(context, vec![])).unwrap();
        }
        let counts = gateway.with_conn(|conn| sessions_by_scene(conn)).unwrap();
        assert_eq!(counts[0], ("meeting".to_string(), 2));
        assert_eq!(counts[1], ("sales".to_string(), 1));
    }

    #[test]
    fn test_catalog_reads_pool() {
        let (conn, _dir) = setup_test_db();
        upsert_theory(&conn, &theory("x", "leadership")).unwrap();
        let gateway = SqliteGateway::from_connection(conn);
        let pool = gateway.candidate_theories().unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].category, "leadership");
    }
}
