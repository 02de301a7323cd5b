//! Station engine: one OS thread that owns the identity store, the ballot
//! ledger and the receipt renderer. Every request runs to completion on
//! that thread, so registration and check-and-append for a ballot never
//! interleave.

use std::collections::BTreeMap;

use facevote_core::{
    begin_registration, identify_voter, BallotLedger, CastOutcome, Choice, EligibleVoter,
    FaceDetector, FixedRegionDetector, Frame, Identifier, IdentityBackend, IdentityStore,
    KnnClassifier, LedgerBackend, ReceiptRenderer, Region, Registered, StoreError, VoteError,
    WholeFrameDetector,
};
use facevote_store::{CsvLedger, FileReceiptRenderer, JsonIdentityBackend, SqliteIdentityBackend};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::{Config, StoreBackend};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

pub type BoxedIdentityBackend = Box<dyn IdentityBackend + Send>;
pub type BoxedLedgerBackend = Box<dyn LedgerBackend + Send>;
pub type BoxedRenderer = Box<dyn ReceiptRenderer + Send>;

/// Counts reported by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StationStatus {
    pub registrations: usize,
    pub distinct_identities: usize,
    pub ballots: usize,
}

/// Everything the engine thread owns.
pub struct Station {
    store: IdentityStore<BoxedIdentityBackend>,
    ledger: BallotLedger<BoxedLedgerBackend>,
    renderer: BoxedRenderer,
    classifier: KnnClassifier,
    dark_threshold: f32,
}

impl Station {
    pub fn new(
        identity: BoxedIdentityBackend,
        ledger: BoxedLedgerBackend,
        renderer: BoxedRenderer,
        max_neighbors: usize,
        dark_threshold: f32,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            store: IdentityStore::open(identity)?,
            ledger: BallotLedger::new(ledger),
            renderer,
            classifier: KnnClassifier::new(max_neighbors),
            dark_threshold,
        })
    }

    /// Open the file-backed station described by `config`.
    pub fn open(config: &Config) -> Result<Self, StoreError> {
        let identity: BoxedIdentityBackend = match config.store_backend {
            StoreBackend::Json => Box::new(JsonIdentityBackend::new(&config.data_dir)),
            StoreBackend::Sqlite => Box::new(SqliteIdentityBackend::open(&config.sqlite_path())?),
        };
        let station = Self::new(
            identity,
            Box::new(CsvLedger::in_dir(&config.data_dir)),
            Box::new(FileReceiptRenderer::new(&config.data_dir)),
            config.max_neighbors,
            config.dark_threshold,
        )?;
        tracing::info!(
            data_dir = %config.data_dir.display(),
            backend = %config.store_backend,
            registrations = station.store.len(),
            "station opened"
        );
        Ok(station)
    }

    fn detector(&self, region: Option<Region>) -> Box<dyn FaceDetector> {
        match region {
            Some(r) => Box::new(FixedRegionDetector::new(r)),
            None => Box::new(WholeFrameDetector::new(self.dark_threshold)),
        }
    }

    fn register(
        &mut self,
        identifier: &str,
        frame: &Frame,
        region: Option<Region>,
    ) -> Result<Registered, VoteError> {
        let pending = begin_registration(&self.store, identifier)?;
        let mut detector = self.detector(region);
        pending.capture(&mut self.store, frame, &mut detector)
    }

    fn identify(&mut self, frame: &Frame, region: Option<Region>) -> Result<EligibleVoter, VoteError> {
        let mut detector = self.detector(region);
        identify_voter(
            &self.store,
            &self.ledger,
            frame,
            &mut detector,
            &mut self.classifier,
        )
    }

    fn cast(&mut self, voter: EligibleVoter, choice: Choice) -> Result<CastOutcome, VoteError> {
        voter.cast(&mut self.ledger, choice, &mut self.renderer)
    }

    fn status(&self) -> Result<StationStatus, VoteError> {
        Ok(StationStatus {
            registrations: self.store.len(),
            distinct_identities: self.store.distinct_identities(),
            ballots: self.ledger.ballots()?.len(),
        })
    }

    fn results(&self) -> Result<BTreeMap<Choice, usize>, VoteError> {
        Ok(self.ledger.tally()?)
    }
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Messages sent from the CLI to the engine thread.
enum EngineRequest {
    Register {
        identifier: String,
        frame: Frame,
        region: Option<Region>,
        reply: Reply<Registered>,
    },
    Identify {
        frame: Frame,
        region: Option<Region>,
        reply: Reply<EligibleVoter>,
    },
    Cast {
        voter: EligibleVoter,
        choice: Choice,
        reply: Reply<CastOutcome>,
    },
    Status {
        reply: Reply<StationStatus>,
    },
    List {
        reply: Reply<Vec<Identifier>>,
    },
    Results {
        reply: Reply<BTreeMap<Choice, usize>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Register `identifier` against the face found in `frame`.
    pub async fn register(
        &self,
        identifier: String,
        frame: Frame,
        region: Option<Region>,
    ) -> Result<Registered, EngineError> {
        self.request(|reply| EngineRequest::Register {
            identifier,
            frame,
            region,
            reply,
        })
        .await
    }

    /// Recognise the voter in `frame` and confirm they have not voted.
    pub async fn identify(
        &self,
        frame: Frame,
        region: Option<Region>,
    ) -> Result<EligibleVoter, EngineError> {
        self.request(|reply| EngineRequest::Identify {
            frame,
            region,
            reply,
        })
        .await
    }

    /// Record the ballot for an identified voter and write the receipt.
    pub async fn cast(&self, voter: EligibleVoter, choice: Choice) -> Result<CastOutcome, EngineError> {
        self.request(|reply| EngineRequest::Cast {
            voter,
            choice,
            reply,
        })
        .await
    }

    pub async fn status(&self) -> Result<StationStatus, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }

    /// Registered identifiers in registration order.
    pub async fn list(&self) -> Result<Vec<Identifier>, EngineError> {
        self.request(|reply| EngineRequest::List { reply }).await
    }

    /// Ballot count per choice.
    pub async fn results(&self) -> Result<BTreeMap<Choice, usize>, EngineError> {
        self.request(|reply| EngineRequest::Results { reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread exits once every `EngineHandle` has been dropped.
pub fn spawn_engine(mut station: Station) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facevote-engine".into())
        .spawn(move || {
            tracing::debug!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Register {
                        identifier,
                        frame,
                        region,
                        reply,
                    } => {
                        let result = station.register(&identifier, &frame, region);
                        log_outcome("register", &result);
                        let _ = reply.send(result.map_err(EngineError::from));
                    }
                    EngineRequest::Identify {
                        frame,
                        region,
                        reply,
                    } => {
                        let result = station.identify(&frame, region);
                        log_outcome("identify", &result);
                        let _ = reply.send(result.map_err(EngineError::from));
                    }
                    EngineRequest::Cast {
                        voter,
                        choice,
                        reply,
                    } => {
                        let result = station.cast(voter, choice);
                        log_outcome("cast", &result);
                        let _ = reply.send(result.map_err(EngineError::from));
                    }
                    EngineRequest::Status { reply } => {
                        let _ = reply.send(station.status().map_err(EngineError::from));
                    }
                    EngineRequest::List { reply } => {
                        let _ = reply.send(Ok(station.store.identifiers().to_vec()));
                    }
                    EngineRequest::Results { reply } => {
                        let _ = reply.send(station.results().map_err(EngineError::from));
                    }
                }
            }
            tracing::debug!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn log_outcome<T>(operation: &'static str, result: &Result<T, VoteError>) {
    if let Err(e) = result {
        tracing::info!(operation, reason = ?e.rejection(), error = %e, "request rejected");
    }
}
