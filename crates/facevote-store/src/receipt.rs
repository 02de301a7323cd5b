//! Receipt files.

use std::fs;
use std::path::{Path, PathBuf};

use facevote_core::{Receipt, ReceiptHandle, ReceiptRenderer, StoreError};

/// Writes `receipt_<identifier>.txt` into a directory.
#[derive(Debug, Clone)]
pub struct FileReceiptRenderer {
    dir: PathBuf,
}

impl FileReceiptRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, receipt: &Receipt) -> PathBuf {
        self.dir
            .join(format!("receipt_{}.txt", receipt.identifier.as_str()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ReceiptRenderer for FileReceiptRenderer {
    fn render(&mut self, receipt: &Receipt) -> Result<ReceiptHandle, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(receipt);
        fs::write(&path, receipt.to_text())?;
        tracing::info!(
            receipt = %receipt.receipt_id,
            path = %path.display(),
            "receipt written"
        );
        Ok(ReceiptHandle {
            receipt_id: receipt.receipt_id,
            location: path.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facevote_core::{Ballot, Choice, Identifier};
    use tempfile::tempdir;

    #[test]
    fn test_receipt_written_keyed_by_identifier() {
        let dir = tempdir().unwrap();
        let ballot = Ballot {
            identifier: Identifier::parse("123456789012").unwrap(),
            choice: Choice::new("NOTA"),
            cast_at: chrono::NaiveDate::from_ymd_opt(2024, 2, 2)
                .unwrap()
                .and_hms_opt(7, 8, 9)
                .unwrap(),
        };
        let receipt = Receipt::for_ballot(&ballot);

        let mut renderer = FileReceiptRenderer::new(dir.path());
        let handle = renderer.render(&receipt).unwrap();

        let path = dir.path().join("receipt_123456789012.txt");
        assert_eq!(handle.location, path.display().to_string());
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("XXXX-XXXX-9012"));
        assert!(text.contains("Voted for: NOTA"));
        assert!(text.contains("Date: 02-02-2024"));
        assert!(text.contains("Time: 07:08:09"));
    }
}
