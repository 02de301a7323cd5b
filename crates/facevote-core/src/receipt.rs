//! Vote receipts.

use std::fmt::Write as _;

use chrono::NaiveDateTime;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{Ballot, Choice, Identifier, DATE_FORMAT, TIME_FORMAT};

/// Everything printed on a receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub receipt_id: Uuid,
    #[serde(skip)]
    pub identifier: Identifier,
    pub masked_identifier: String,
    pub choice: Choice,
    pub cast_at: NaiveDateTime,
    /// SHA-256 over the ledger row, hex encoded.
    pub digest: String,
}

impl Receipt {
    pub fn for_ballot(ballot: &Ballot) -> Self {
        Self {
            receipt_id: Uuid::new_v4(),
            identifier: ballot.identifier.clone(),
            masked_identifier: ballot.identifier.masked(),
            choice: ballot.choice.clone(),
            cast_at: ballot.cast_at,
            digest: ballot_digest(ballot),
        }
    }

    pub fn date(&self) -> String {
        self.cast_at.format(DATE_FORMAT).to_string()
    }

    pub fn time(&self) -> String {
        self.cast_at.format(TIME_FORMAT).to_string()
    }

    /// Plain-text rendering. Only the masked identifier appears.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "E-Voting Receipt");
        let _ = writeln!(out);
        let _ = writeln!(out, "Identifier: {}", self.masked_identifier);
        let _ = writeln!(out, "Voted for: {}", self.choice);
        let _ = writeln!(out, "Date: {}", self.date());
        let _ = writeln!(out, "Time: {}", self.time());
        let _ = writeln!(out, "Receipt: {}", self.receipt_id);
        let _ = writeln!(out, "Verification: {}", self.digest);
        let _ = writeln!(out);
        let _ = writeln!(out, "Thank you for participating in the election.");
        out
    }
}

/// Digest of the `NAME,VOTE,DATE,TIME` row a ballot is stored as.
pub fn ballot_digest(ballot: &Ballot) -> String {
    let row = format!(
        "{},{},{},{}",
        ballot.identifier,
        ballot.choice,
        ballot.date(),
        ballot.time()
    );
    format!("{:x}", Sha256::digest(row.as_bytes()))
}

/// Where a rendered receipt ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptHandle {
    pub receipt_id: Uuid,
    pub location: String,
}

/// Produces a durable receipt artifact.
pub trait ReceiptRenderer {
    fn render(&mut self, receipt: &Receipt) -> Result<ReceiptHandle, StoreError>;
}

impl<T: ReceiptRenderer + ?Sized> ReceiptRenderer for Box<T> {
    fn render(&mut self, receipt: &Receipt) -> Result<ReceiptHandle, StoreError> {
        (**self).render(receipt)
    }
}

/// Keeps rendered receipts in memory.
#[derive(Debug, Default)]
pub struct MemoryReceiptRenderer {
    pub rendered: Vec<Receipt>,
}

impl ReceiptRenderer for MemoryReceiptRenderer {
    fn render(&mut self, receipt: &Receipt) -> Result<ReceiptHandle, StoreError> {
        self.rendered.push(receipt.clone());
        Ok(ReceiptHandle {
            receipt_id: receipt.receipt_id,
            location: format!("memory:{}", self.rendered.len() - 1),
        })
    }
}
