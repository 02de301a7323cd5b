use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::detector::DetectorError;
use crate::types::FrameError;

/// Failure of a persistence backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("{context}: {source}")]
    Backend {
        context: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn backend(
        context: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Backend {
            context,
            source: source.into(),
        }
    }
}

/// Everything a registration or voting session can end with.
#[derive(Error, Debug)]
pub enum VoteError {
    #[error("identifier must be exactly 12 digits and numeric (got {length} characters)")]
    InvalidIdentifier { length: usize },
    #[error("identifier {0} is already registered")]
    DuplicateIdentifier(String),
    #[error("no face detected, please try again")]
    NoFaceDetected,
    #[error("ballot choice must not be empty")]
    EmptyChoice,
    #[error("identifier {0} has already voted")]
    AlreadyVoted(String),
    #[error("no registered faces found, register first")]
    NoRegistrations,
    #[error("feature vector must have {expected} values, got {actual}")]
    FeatureLength { expected: usize, actual: usize },
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),
}

/// Coarse outcome class of a [`VoteError`], for reporting to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Malformed identifier; re-enter it.
    InvalidIdentifier,
    /// Already registered; nothing changed.
    DuplicateIdentifier,
    /// Retry the capture.
    NoFaceDetected,
    /// Blank choice; pick again.
    InvalidChoice,
    /// Terminal for the session.
    AlreadyVoted,
    /// Verification attempted against an empty store.
    NoRegistrations,
    /// Capture, detector or classifier input was unusable.
    BadCapture,
    /// Write or read failed; the attempt is abandoned.
    PersistenceFailure,
}

impl VoteError {
    pub fn rejection(&self) -> Rejection {
        match self {
            VoteError::InvalidIdentifier { .. } => Rejection::InvalidIdentifier,
            VoteError::DuplicateIdentifier(_) => Rejection::DuplicateIdentifier,
            VoteError::NoFaceDetected => Rejection::NoFaceDetected,
            VoteError::EmptyChoice => Rejection::InvalidChoice,
            VoteError::AlreadyVoted(_) => Rejection::AlreadyVoted,
            VoteError::NoRegistrations => Rejection::NoRegistrations,
            VoteError::FeatureLength { .. }
            | VoteError::Frame(_)
            | VoteError::Detector(_)
            | VoteError::Classifier(_) => Rejection::BadCapture,
            VoteError::PersistenceFailure(_) => Rejection::PersistenceFailure,
        }
    }

    /// Whether repeating the workflow from its start can succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.rejection(), Rejection::AlreadyVoted)
    }
}
