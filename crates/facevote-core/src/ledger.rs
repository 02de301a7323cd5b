//! Ballot ledger: append-only record of cast votes, at most one per
//! identifier.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{NaiveDateTime, Timelike};

use crate::error::{StoreError, VoteError};
use crate::types::{Ballot, Choice, Identifier};

/// Source of cast timestamps. Ballots are never stamped with caller time.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Deterministic clock for tests. Time only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self {
            current: Mutex::new(at),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut t) = self.current.lock() {
            *t += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.current.lock() {
            Ok(t) => *t,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Durable home of the ballot sequence.
pub trait LedgerBackend {
    /// All ballots in append order.
    fn records(&self) -> Result<Vec<Ballot>, StoreError>;
    /// Append one ballot after all existing ones.
    fn append(&mut self, ballot: &Ballot) -> Result<(), StoreError>;
}

impl<T: LedgerBackend + ?Sized> LedgerBackend for Box<T> {
    fn records(&self) -> Result<Vec<Ballot>, StoreError> {
        (**self).records()
    }

    fn append(&mut self, ballot: &Ballot) -> Result<(), StoreError> {
        (**self).append(ballot)
    }
}

/// Volatile ledger backend.
#[derive(Debug, Default)]
pub struct MemoryLedgerBackend {
    ballots: Vec<Ballot>,
}

impl MemoryLedgerBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerBackend for MemoryLedgerBackend {
    fn records(&self) -> Result<Vec<Ballot>, StoreError> {
        Ok(self.ballots.clone())
    }

    fn append(&mut self, ballot: &Ballot) -> Result<(), StoreError> {
        self.ballots.push(ballot.clone());
        Ok(())
    }
}

/// The ballot ledger.
///
/// `cast` takes `&mut self`, so within one process the eligibility check and
/// the append cannot interleave with another cast on the same ledger.
/// Separate processes sharing one backing file are not coordinated.
pub struct BallotLedger<B, C = SystemClock> {
    backend: B,
    clock: C,
}

impl<B: LedgerBackend> BallotLedger<B, SystemClock> {
    pub fn new(backend: B) -> Self {
        Self::with_clock(backend, SystemClock)
    }
}

impl<B: LedgerBackend, C: Clock> BallotLedger<B, C> {
    pub fn with_clock(backend: B, clock: C) -> Self {
        Self { backend, clock }
    }

    /// Scan the persisted ballots for `identifier`.
    pub fn has_voted(&self, identifier: &Identifier) -> Result<bool, StoreError> {
        Ok(self
            .backend
            .records()?
            .iter()
            .any(|b| &b.identifier == identifier))
    }

    /// Record a vote. Re-checks eligibility immediately before appending.
    /// The choice is stored verbatim but must not be blank.
    pub fn cast(&mut self, identifier: Identifier, choice: Choice) -> Result<Ballot, VoteError> {
        if choice.is_blank() {
            return Err(VoteError::EmptyChoice);
        }
        if self.has_voted(&identifier)? {
            tracing::warn!(identifier = %identifier.masked(), "repeat cast rejected");
            return Err(VoteError::AlreadyVoted(identifier.masked()));
        }

        let now = self.clock.now();
        let ballot = Ballot {
            identifier,
            choice,
            cast_at: now.with_nanosecond(0).unwrap_or(now),
        };
        self.backend.append(&ballot)?;

        tracing::info!(
            identifier = %ballot.identifier.masked(),
            date = %ballot.date(),
            time = %ballot.time(),
            "ballot recorded"
        );
        Ok(ballot)
    }

    /// Every ballot in cast order.
    pub fn ballots(&self) -> Result<Vec<Ballot>, StoreError> {
        self.backend.records()
    }

    /// Ballot count per choice.
    pub fn tally(&self) -> Result<BTreeMap<Choice, usize>, StoreError> {
        let mut counts = BTreeMap::new();
        for ballot in self.backend.records()? {
            *counts.entry(ballot.choice).or_insert(0) += 1;
        }
        Ok(counts)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
