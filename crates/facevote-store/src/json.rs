//! Identity store as two parallel JSON documents.
//!
//! `names.json` holds the identifier sequence, `faces_data.json` the feature
//! vectors in the same order. Each save rewrites both files in full, vectors
//! first, each through a temp file and rename.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use facevote_core::{FeatureVector, Identifier, IdentityBackend, Registry, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const NAMES_FILE: &str = "names.json";
pub const FACES_FILE: &str = "faces_data.json";

/// JSON-file identity backend rooted at a data directory.
#[derive(Debug, Clone)]
pub struct JsonIdentityBackend {
    dir: PathBuf,
}

impl JsonIdentityBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn names_path(&self) -> PathBuf {
        self.dir.join(NAMES_FILE)
    }

    pub fn faces_path(&self) -> PathBuf {
        self.dir.join(FACES_FILE)
    }
}

impl IdentityBackend for JsonIdentityBackend {
    fn load(&self) -> Result<Registry, StoreError> {
        let identifiers: Vec<Identifier> = read_json(&self.names_path())?.unwrap_or_default();
        let vectors: Vec<FeatureVector> = read_json(&self.faces_path())?.unwrap_or_default();
        Registry::from_parts(identifiers, vectors)
    }

    fn save(&mut self, registry: &Registry) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        write_json_atomic(&self.faces_path(), registry.vectors())?;
        write_json_atomic(&self.names_path(), registry.identifiers())?;
        tracing::debug!(dir = %self.dir.display(), entries = registry.len(), "identity files written");
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_reader(BufReader::new(file))
        .map(Some)
        .map_err(|e| StoreError::backend("json decode", e))
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    let file = File::create(&tmp)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|e| StoreError::backend("json encode", e))?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}
