//! facevote-store — Durable backends for the identity store, the ballot
//! ledger and vote receipts.

pub mod csv_ledger;
pub mod json;
pub mod receipt;
pub mod sqlite;

pub use csv_ledger::CsvLedger;
pub use json::JsonIdentityBackend;
pub use receipt::FileReceiptRenderer;
pub use sqlite::SqliteIdentityBackend;
