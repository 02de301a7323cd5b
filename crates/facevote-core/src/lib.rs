//! facevote-core — Identity registry and ballot ledger for a face-gated
//! voting station.
//!
//! Registration stores a flattened face crop against a 12-digit identifier.
//! Voting resolves a new capture to the nearest registered identity and
//! records at most one ballot per identity in an append-only ledger.

pub mod classifier;
pub mod detector;
pub mod error;
pub mod features;
pub mod identity;
pub mod ledger;
pub mod receipt;
pub mod types;
pub mod workflow;

pub use classifier::{Classifier, KnnClassifier, Prediction};
pub use detector::{FaceDetector, FixedRegionDetector, WholeFrameDetector};
pub use error::{Rejection, StoreError, VoteError};
pub use identity::{IdentityBackend, IdentityStore, MemoryIdentityBackend, Registry};
pub use ledger::{BallotLedger, Clock, FixedClock, LedgerBackend, MemoryLedgerBackend, SystemClock};
pub use receipt::{Receipt, ReceiptHandle, ReceiptRenderer};
pub use types::{Ballot, Choice, FeatureVector, Frame, Identifier, Region};
pub use workflow::{begin_registration, identify_voter, CastOutcome, EligibleVoter, Registered};
