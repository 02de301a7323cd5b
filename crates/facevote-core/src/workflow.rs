//! Registration and voting sessions.
//!
//! Each session is a small typestate machine. A value of the intermediate
//! type (`PendingRegistration`, `EligibleVoter`) can only be obtained by
//! passing the earlier checks, and consuming it is the only way forward.
//!
//! Registration: awaiting identifier -> awaiting capture -> validating ->
//! accepted | rejected.
//!
//! Voting: awaiting capture -> detecting -> classifying -> checking
//! eligibility -> awaiting choice -> recording -> complete | rejected.

use serde::Serialize;

use crate::classifier::{Classifier, Prediction};
use crate::detector::FaceDetector;
use crate::error::VoteError;
use crate::features;
use crate::identity::{IdentityBackend, IdentityStore};
use crate::ledger::{BallotLedger, Clock, LedgerBackend};
use crate::receipt::{Receipt, ReceiptHandle, ReceiptRenderer};
use crate::types::{Ballot, Choice, FeatureVector, Frame, Identifier, Region};

/// Registration that has a valid, unregistered identifier and is waiting
/// for a capture.
#[derive(Debug)]
pub struct PendingRegistration {
    identifier: Identifier,
}

/// A completed registration.
#[derive(Debug, Clone, Serialize)]
pub struct Registered {
    pub identifier: Identifier,
    /// Face region the stored vector was taken from.
    pub region: Region,
}

/// Start a registration by supplying the identifier.
pub fn begin_registration<B: IdentityBackend>(
    store: &IdentityStore<B>,
    raw_identifier: &str,
) -> Result<PendingRegistration, VoteError> {
    let identifier = Identifier::parse(raw_identifier)?;
    if store.is_registered(&identifier) {
        return Err(VoteError::DuplicateIdentifier(identifier.masked()));
    }
    tracing::debug!(identifier = %identifier.masked(), "registration: awaiting capture");
    Ok(PendingRegistration { identifier })
}

impl PendingRegistration {
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Detect a face in `frame` and store its feature vector.
    ///
    /// Only the first detected region is registered; any others are ignored.
    pub fn capture<B, D>(
        self,
        store: &mut IdentityStore<B>,
        frame: &Frame,
        detector: &mut D,
    ) -> Result<Registered, VoteError>
    where
        B: IdentityBackend,
        D: FaceDetector + ?Sized,
    {
        let (region, vector) = first_face(frame, detector)?;
        tracing::debug!(identifier = %self.identifier.masked(), ?region, "registration: validating");

        store.register(self.identifier.clone(), vector)?;
        Ok(Registered {
            identifier: self.identifier,
            region,
        })
    }
}

/// A recognised voter who has not voted yet, waiting for a choice.
#[derive(Debug, Clone)]
pub struct EligibleVoter {
    identifier: Identifier,
    prediction: Prediction,
}

/// Outcome of a completed voting session.
#[derive(Debug, Clone)]
pub struct CastOutcome {
    pub ballot: Ballot,
    pub receipt: Receipt,
    pub handle: ReceiptHandle,
}

/// Resolve the face in `frame` to a registered identity and confirm it has
/// not voted yet.
///
/// The classifier is fit from scratch on the store's current contents on
/// every call. It is never touched when the store is empty.
pub fn identify_voter<S, L, C, D, K>(
    store: &IdentityStore<S>,
    ledger: &BallotLedger<L, C>,
    frame: &Frame,
    detector: &mut D,
    classifier: &mut K,
) -> Result<EligibleVoter, VoteError>
where
    S: IdentityBackend,
    L: LedgerBackend,
    C: Clock,
    D: FaceDetector + ?Sized,
    K: Classifier + ?Sized,
{
    if store.is_empty() {
        return Err(VoteError::NoRegistrations);
    }

    let (region, vector) = first_face(frame, detector)?;
    tracing::debug!(?region, "voting: classifying");

    let (labels, vectors) = store.snapshot();
    classifier.fit(vectors, labels)?;
    let prediction = classifier.predict(&vector)?;

    tracing::info!(
        identifier = %prediction.label.masked(),
        distance = prediction.distance,
        votes = prediction.votes,
        neighbors = prediction.neighbors,
        "face recognized"
    );

    if ledger.has_voted(&prediction.label)? {
        return Err(VoteError::AlreadyVoted(prediction.label.masked()));
    }

    Ok(EligibleVoter {
        identifier: prediction.label.clone(),
        prediction,
    })
}

impl EligibleVoter {
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn prediction(&self) -> &Prediction {
        &self.prediction
    }

    /// Record `choice` and render a receipt.
    ///
    /// The ledger re-checks eligibility, so a cast that lost a race with
    /// another one for the same identity ends in `AlreadyVoted`. A receipt
    /// failure is reported, but the ballot stays recorded.
    pub fn cast<L, C, R>(
        self,
        ledger: &mut BallotLedger<L, C>,
        choice: Choice,
        renderer: &mut R,
    ) -> Result<CastOutcome, VoteError>
    where
        L: LedgerBackend,
        C: Clock,
        R: ReceiptRenderer + ?Sized,
    {
        let ballot = ledger.cast(self.identifier, choice)?;
        let receipt = Receipt::for_ballot(&ballot);
        let handle = renderer.render(&receipt).map_err(|e| {
            tracing::warn!(
                identifier = %ballot.identifier.masked(),
                error = %e,
                "ballot recorded but receipt could not be written"
            );
            e
        })?;

        Ok(CastOutcome {
            ballot,
            receipt,
            handle,
        })
    }
}

fn first_face<D: FaceDetector + ?Sized>(
    frame: &Frame,
    detector: &mut D,
) -> Result<(Region, FeatureVector), VoteError> {
    let regions = detector.detect(frame)?;
    let Some(region) = regions.first().copied() else {
        return Err(VoteError::NoFaceDetected);
    };
    if regions.len() > 1 {
        tracing::debug!(ignored = regions.len() - 1, "using first detected face only");
    }
    Ok((region, features::extract(frame, &region)?))
}
