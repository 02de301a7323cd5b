//! Identity store in a SQLite database.
//!
//! One row per registration, ordered by `position`. Vectors are stored as
//! little-endian `f32` blobs. A save replaces every row inside one
//! transaction, so readers never observe half a rewrite.

use std::path::Path;

use facevote_core::{FeatureVector, Identifier, IdentityBackend, Registry, StoreError};
use rusqlite::{params, Connection};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS registrations (
    position   INTEGER PRIMARY KEY,
    identifier TEXT NOT NULL,
    features   BLOB NOT NULL
);
";

fn sqlite(e: rusqlite::Error) -> StoreError {
    StoreError::backend("sqlite", e)
}

/// SQLite identity backend.
pub struct SqliteIdentityBackend {
    conn: Connection,
}

impl SqliteIdentityBackend {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(sqlite)?;
        tracing::debug!(path = %path.display(), "opened identity database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(sqlite)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(sqlite)?;
        Ok(Self { conn })
    }
}

impl IdentityBackend for SqliteIdentityBackend {
    fn load(&self) -> Result<Registry, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT identifier, features FROM registrations ORDER BY position")
            .map_err(sqlite)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))
            .map_err(sqlite)?;

        let mut identifiers = Vec::new();
        let mut vectors = Vec::new();
        for row in rows {
            let (raw, blob) = row.map_err(sqlite)?;
            let identifier = Identifier::parse(&raw)
                .map_err(|e| StoreError::Corrupt(format!("registration row: {e}")))?;
            identifiers.push(identifier);
            vectors.push(decode_features(&blob)?);
        }
        Registry::from_parts(identifiers, vectors)
    }

    fn save(&mut self, registry: &Registry) -> Result<(), StoreError> {
        let tx = self.conn.transaction().map_err(sqlite)?;
        tx.execute("DELETE FROM registrations", []).map_err(sqlite)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO registrations (position, identifier, features) VALUES (?1, ?2, ?3)",
                )
                .map_err(sqlite)?;
            for (position, (identifier, vector)) in registry
                .identifiers()
                .iter()
                .zip(registry.vectors())
                .enumerate()
            {
                stmt.execute(params![
                    position as i64,
                    identifier.as_str(),
                    encode_features(vector)
                ])
                .map_err(sqlite)?;
            }
        }
        tx.commit().map_err(sqlite)?;
        Ok(())
    }
}

fn encode_features(vector: &FeatureVector) -> Vec<u8> {
    vector
        .as_slice()
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

fn decode_features(blob: &[u8]) -> Result<FeatureVector, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::Corrupt(format!(
            "feature blob of {} bytes is not a whole number of f32 values",
            blob.len()
        )));
    }
    let values = blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    FeatureVector::from_values(values).map_err(|e| StoreError::Corrupt(e.to_string()))
}
