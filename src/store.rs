use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::{Mutex, MutexGuard},
};

use log::{debug, warn};
use rusqlite::{params, types::Type, Connection, OptionalExtension};

use crate::{
    error::Result,
    review::{MoveLabel, PlyAnnotation},
};

const LEVEL_KEY: &str = "coach.level";

/// Classifier flags added to `ply_annotations` after its first release
const FLAG_COLUMNS: [&str; 3] = ["is_mate_swing", "is_tactical", "softened"];

#[derive(Debug, thiserror::Error)]
#[error("unknown move label {0:?}")]
struct UnknownLabel(String);

/// Durable player level
pub trait SettingsStore {
    fn get_level(&self) -> Result<Option<u8>>;
    fn upsert_level(&self, level: u8) -> Result<()>;
}

/// Durable per-ply annotations keyed by `(game_id, ply)`
pub trait AnnotationStore {
    fn upsert_annotation(&self, game_id: &str, annotation: &PlyAnnotation) -> Result<()>;
    fn delete_annotation(&self, game_id: &str, ply: u32) -> Result<()>;
    /// All annotations of a game ordered by ply
    fn annotations(&self, game_id: &str) -> Result<Vec<PlyAnnotation>>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// SQLite
// =============================================================================

/// SQLite-backed store for the level and game annotations
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        debug!("Opening coach database: {:?}", path);
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS ply_annotations (
            game_id TEXT NOT NULL,
            ply INTEGER NOT NULL,
            san TEXT NOT NULL,
            uci TEXT NOT NULL,
            fen TEXT NOT NULL,
            eval_before INTEGER NOT NULL,
            eval_after INTEGER NOT NULL,
            delta INTEGER NOT NULL,
            mate_before INTEGER,
            mate_after INTEGER,
            classification TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '[]',
            best_move TEXT,
            is_mate_swing INTEGER NOT NULL DEFAULT 0,
            is_tactical INTEGER NOT NULL DEFAULT 0,
            softened INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (game_id, ply)
        );
        "#,
    )?;
    add_flag_columns(conn)
}

fn add_flag_columns(conn: &Connection) -> Result<()> {
    let existing = conn
        .prepare("SELECT name FROM pragma_table_info('ply_annotations')")?
        .query_map(params![], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for column in FLAG_COLUMNS {
        if !existing.iter().any(|c| c == column) {
            debug!("Adding column ply_annotations.{}", column);
            conn.execute(
                &format!("ALTER TABLE ply_annotations ADD COLUMN {} INTEGER NOT NULL DEFAULT 0", column),
                params![],
            )?;
        }
    }
    Ok(())
}

impl SettingsStore for SqliteStore {
    fn get_level(&self) -> Result<Option<u8>> {
        let conn = lock(&self.conn);
        let value: Option<String> = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", params![LEVEL_KEY], |row| row.get(0))
            .optional()?;

        Ok(value.and_then(|v| match v.trim().parse::<u8>() {
            Ok(level) => Some(level),
            Err(_) => {
                warn!("Ignoring unreadable stored level: {:?}", v);
                None
            }
        }))
    }

    fn upsert_level(&self, level: u8) -> Result<()> {
        let conn = lock(&self.conn);
        conn.execute(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
            params![LEVEL_KEY, level.to_string()],
        )?;
        Ok(())
    }
}

impl AnnotationStore for SqliteStore {
    fn upsert_annotation(&self, game_id: &str, annotation: &PlyAnnotation) -> Result<()> {
        let notes = serde_json::to_string(&annotation.notes)?;
        let conn = lock(&self.conn);
        conn.execute(
            r#"
            INSERT INTO ply_annotations (
                game_id, ply, san, uci, fen, eval_before, eval_after, delta,
                mate_before, mate_after, classification, notes, best_move,
                is_mate_swing, is_tactical, softened
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(game_id, ply) DO UPDATE SET
                san = excluded.san,
                uci = excluded.uci,
                fen = excluded.fen,
                eval_before = excluded.eval_before,
                eval_after = excluded.eval_after,
                delta = excluded.delta,
                mate_before = excluded.mate_before,
                mate_after = excluded.mate_after,
                classification = excluded.classification,
                notes = excluded.notes,
                best_move = excluded.best_move,
                is_mate_swing = excluded.is_mate_swing,
                is_tactical = excluded.is_tactical,
                softened = excluded.softened
            "#,
            params![
                game_id,
                annotation.ply,
                annotation.san,
                annotation.uci,
                annotation.fen,
                annotation.eval_before,
                annotation.eval_after,
                annotation.delta,
                annotation.mate_before,
                annotation.mate_after,
                annotation.classification.as_str(),
                notes,
                annotation.best_move,
                annotation.is_mate_swing,
                annotation.is_tactical,
                annotation.softened,
            ],
        )?;
        Ok(())
    }

    fn delete_annotation(&self, game_id: &str, ply: u32) -> Result<()> {
        let conn = lock(&self.conn);
        conn.execute(
            "DELETE FROM ply_annotations WHERE game_id = ?1 AND ply = ?2",
            params![game_id, ply],
        )?;
        Ok(())
    }

    fn annotations(&self, game_id: &str) -> Result<Vec<PlyAnnotation>> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            r#"
            SELECT ply, san, uci, fen, eval_before, eval_after, delta,
                   mate_before, mate_after, classification, notes, best_move,
                   is_mate_swing, is_tactical, softened
            FROM ply_annotations
            WHERE game_id = ?1
            ORDER BY ply
            "#,
        )?;

        let rows = stmt
            .query_map(params![game_id], |row| {
                let label: String = row.get(9)?;
                let classification = MoveLabel::parse(&label)
                    .ok_or_else(|| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(UnknownLabel(label))))?;
                let notes: String = row.get(10)?;
                let notes = serde_json::from_str(&notes)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;
                Ok(PlyAnnotation {
                    ply: row.get(0)?,
                    san: row.get(1)?,
                    uci: row.get(2)?,
                    fen: row.get(3)?,
                    eval_before: row.get(4)?,
                    eval_after: row.get(5)?,
                    delta: row.get(6)?,
                    mate_before: row.get(7)?,
                    mate_after: row.get(8)?,
                    classification,
                    is_mate_swing: row.get(12)?,
                    is_tactical: row.get(13)?,
                    softened: row.get(14)?,
                    notes,
                    best_move: row.get(11)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Volatile store for tests and sessions without a database
#[derive(Debug, Default)]
pub struct MemoryStore {
    level: Mutex<Option<u8>>,
    level_writes: Mutex<usize>,
    games: Mutex<HashMap<String, BTreeMap<u32, PlyAnnotation>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times the level has been written
    pub fn level_writes(&self) -> usize {
        *lock(&self.level_writes)
    }
}

impl SettingsStore for MemoryStore {
    fn get_level(&self) -> Result<Option<u8>> {
        Ok(*lock(&self.level))
    }

    fn upsert_level(&self, level: u8) -> Result<()> {
        *lock(&self.level) = Some(level);
        *lock(&self.level_writes) += 1;
        Ok(())
    }
}

impl AnnotationStore for MemoryStore {
    fn upsert_annotation(&self, game_id: &str, annotation: &PlyAnnotation) -> Result<()> {
        lock(&self.games)
            .entry(game_id.to_string())
            .or_default()
            .insert(annotation.ply, annotation.clone());
        Ok(())
    }

    fn delete_annotation(&self, game_id: &str, ply: u32) -> Result<()> {
        if let Some(game) = lock(&self.games).get_mut(game_id) {
            game.remove(&ply);
        }
        Ok(())
    }

    fn annotations(&self, game_id: &str) -> Result<Vec<PlyAnnotation>> {
        Ok(lock(&self.games)
            .get(game_id)
            .map(|game| game.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::review::{classify, MoveEvaluation};

    fn annotation(ply: u32) -> PlyAnnotation {
        let eval = MoveEvaluation {
            eval_before: 30,
            eval_after: -250,
            mate_before: None,
            mate_after: Some(-4),
        };
        PlyAnnotation::new(
            ply,
            "Kh1".into(),
            "g1h1".into(),
            "6k1/8/8/8/8/8/5PPP/7K b - - 1 1".into(),
            &eval,
            &classify(&eval),
        )
        .with_best_move(Some("f2f3".into()))
    }

    #[test]
    fn test_sqlite_level_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get_level().unwrap(), None);
        store.upsert_level(12).unwrap();
        store.upsert_level(13).unwrap();
        assert_eq!(store.get_level().unwrap(), Some(13));
    }

    #[test]
    fn test_sqlite_annotations() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_annotation("g1", &annotation(3)).unwrap();
        store.upsert_annotation("g1", &annotation(1)).unwrap();
        store.upsert_annotation("g2", &annotation(1)).unwrap();

        let stored = store.annotations("g1").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].ply, 1);
        assert_eq!(stored[1], annotation(3));
        assert_eq!(stored[1].classification, MoveLabel::Blunder);
        assert!(!stored[1].notes.is_empty());
        assert!(stored[1].is_mate_swing);

        store.delete_annotation("g1", 3).unwrap();
        assert_eq!(store.annotations("g1").unwrap().len(), 1);
        assert_eq!(store.annotations("g2").unwrap().len(), 1);
        assert!(store.annotations("missing").unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_rejects_unknown_label() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_annotation("g1", &annotation(1)).unwrap();
        lock(&store.conn)
            .execute("UPDATE ply_annotations SET classification = 'brilliant' WHERE ply = 1", params![])
            .unwrap();

        let err = store.annotations("g1").unwrap_err();
        assert!(matches!(
            err,
            Error::Store(rusqlite::Error::FromSqlConversionFailure(9, Type::Text, _))
        ));
    }

    #[test]
    fn test_sqlite_rejects_corrupt_notes() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_annotation("g1", &annotation(1)).unwrap();
        lock(&store.conn)
            .execute("UPDATE ply_annotations SET notes = '{not json' WHERE ply = 1", params![])
            .unwrap();

        let err = store.annotations("g1").unwrap_err();
        assert!(matches!(
            err,
            Error::Store(rusqlite::Error::FromSqlConversionFailure(10, Type::Text, _))
        ));
    }

    #[test]
    fn test_flag_columns_added_to_existing_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE ply_annotations (
                game_id TEXT NOT NULL,
                ply INTEGER NOT NULL,
                san TEXT NOT NULL,
                uci TEXT NOT NULL,
                fen TEXT NOT NULL,
                eval_before INTEGER NOT NULL,
                eval_after INTEGER NOT NULL,
                delta INTEGER NOT NULL,
                mate_before INTEGER,
                mate_after INTEGER,
                classification TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '[]',
                best_move TEXT,
                PRIMARY KEY (game_id, ply)
            );
            INSERT INTO ply_annotations VALUES ('g1', 1, 'e4', 'e2e4', 'fen', 20, 10, -10, NULL, NULL, 'ok', '[]', NULL);
            "#,
        )
        .unwrap();

        let store = SqliteStore::with_connection(conn).unwrap();
        let stored = store.annotations("g1").unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].is_mate_swing && !stored[0].is_tactical && !stored[0].softened);

        store.upsert_annotation("g1", &annotation(3)).unwrap();
        assert!(store.annotations("g1").unwrap()[1].is_mate_swing);
    }

    #[test]
    fn test_sqlite_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("coach.db3");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert_level(4).unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get_level().unwrap(), Some(4));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.upsert_annotation("g", &annotation(5)).unwrap();
        store.upsert_annotation("g", &annotation(5)).unwrap();
        assert_eq!(store.annotations("g").unwrap().len(), 1);
        store.delete_annotation("g", 5).unwrap();
        assert!(store.annotations("g").unwrap().is_empty());

        store.upsert_level(9).unwrap();
        assert_eq!(store.get_level().unwrap(), Some(9));
        assert_eq!(store.level_writes(), 1);
    }
}
