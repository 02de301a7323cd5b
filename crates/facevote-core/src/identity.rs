//! Identity store: registered identifiers and their face feature vectors.
//!
//! Held as two parallel sequences kept in lockstep. The store only grows;
//! every successful registration rewrites the whole collection through the
//! backend.

use crate::error::{StoreError, VoteError};
use crate::types::{FeatureVector, Identifier};

/// Identifiers and vectors in registration order; index i of one belongs to
/// index i of the other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    identifiers: Vec<Identifier>,
    vectors: Vec<FeatureVector>,
}

impl Registry {
    /// Rebuild from persisted parallel sequences, rejecting unequal lengths.
    pub fn from_parts(
        identifiers: Vec<Identifier>,
        vectors: Vec<FeatureVector>,
    ) -> Result<Self, StoreError> {
        if identifiers.len() != vectors.len() {
            return Err(StoreError::Corrupt(format!(
                "{} identifiers but {} feature vectors",
                identifiers.len(),
                vectors.len()
            )));
        }
        Ok(Self {
            identifiers,
            vectors,
        })
    }

    pub fn identifiers(&self) -> &[Identifier] {
        &self.identifiers
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.identifiers.contains(identifier)
    }

    fn push(&mut self, identifier: Identifier, vector: FeatureVector) {
        self.identifiers.push(identifier);
        self.vectors.push(vector);
    }

    fn pop(&mut self) {
        self.identifiers.pop();
        self.vectors.pop();
    }
}

/// Durable home of a [`Registry`].
pub trait IdentityBackend {
    /// Read the full registry. A backend with nothing stored yet returns an
    /// empty registry.
    fn load(&self) -> Result<Registry, StoreError>;
    /// Replace the stored registry with `registry`.
    fn save(&mut self, registry: &Registry) -> Result<(), StoreError>;
}

impl<T: IdentityBackend + ?Sized> IdentityBackend for Box<T> {
    fn load(&self) -> Result<Registry, StoreError> {
        (**self).load()
    }

    fn save(&mut self, registry: &Registry) -> Result<(), StoreError> {
        (**self).save(registry)
    }
}

/// Volatile backend for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryIdentityBackend {
    saved: Registry,
    saves: usize,
}

impl MemoryIdentityBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `save` has been called.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl IdentityBackend for MemoryIdentityBackend {
    fn load(&self) -> Result<Registry, StoreError> {
        Ok(self.saved.clone())
    }

    fn save(&mut self, registry: &Registry) -> Result<(), StoreError> {
        self.saved = registry.clone();
        self.saves += 1;
        Ok(())
    }
}

/// The identity store.
pub struct IdentityStore<B> {
    backend: B,
    registry: Registry,
}

impl<B: IdentityBackend> IdentityStore<B> {
    /// Load the current registry from `backend`.
    pub fn open(backend: B) -> Result<Self, StoreError> {
        let registry = backend.load()?;
        tracing::debug!(entries = registry.len(), "identity store opened");
        Ok(Self { backend, registry })
    }

    pub fn is_registered(&self, identifier: &Identifier) -> bool {
        self.registry.contains(identifier)
    }

    /// Validate `raw`, then [`register`](Self::register) it.
    pub fn register_raw(
        &mut self,
        raw: &str,
        vector: FeatureVector,
    ) -> Result<Identifier, VoteError> {
        let identifier = Identifier::parse(raw)?;
        self.register(identifier.clone(), vector)?;
        Ok(identifier)
    }

    /// Append one (identifier, vector) pair and persist the whole store.
    ///
    /// On a persistence failure the in-memory append is undone.
    pub fn register(
        &mut self,
        identifier: Identifier,
        vector: FeatureVector,
    ) -> Result<(), VoteError> {
        if self.is_registered(&identifier) {
            return Err(VoteError::DuplicateIdentifier(identifier.masked()));
        }

        let masked = identifier.masked();
        self.registry.push(identifier, vector);
        if let Err(e) = self.backend.save(&self.registry) {
            self.registry.pop();
            tracing::error!(identifier = %masked, error = %e, "identity store write failed");
            return Err(e.into());
        }

        tracing::info!(
            identifier = %masked,
            entries = self.registry.len(),
            "identity registered"
        );
        Ok(())
    }

    /// Current contents, for fitting a classifier.
    pub fn snapshot(&self) -> (&[Identifier], &[FeatureVector]) {
        (self.registry.identifiers(), self.registry.vectors())
    }

    /// Registered identifiers in registration order, one per entry.
    pub fn identifiers(&self) -> &[Identifier] {
        self.registry.identifiers()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Number of distinct identifiers.
    pub fn distinct_identities(&self) -> usize {
        let mut ids: Vec<&Identifier> = self.registry.identifiers().iter().collect();
        ids.sort();
        ids.dedup();
        ids.len()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingBackend;

    impl IdentityBackend for FailingBackend {
        fn load(&self) -> Result<Registry, StoreError> {
            Ok(Registry::default())
        }

        fn save(&mut self, _: &Registry) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }
    }

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    fn store() -> IdentityStore<MemoryIdentityBackend> {
        IdentityStore::open(MemoryIdentityBackend::new()).unwrap()
    }

    #[test]
    fn test_register_then_is_registered() {
        let mut s = store();
        s.register(id("123456789012"), FeatureVector::filled(1.0)).unwrap();
        assert!(s.is_registered(&id("123456789012")));
        assert_eq!(s.len(), 1);
        assert_eq!(s.backend().saves(), 1);
    }

    #[test]
    fn test_duplicate_rejected_store_unchanged() {
        let mut s = store();
        s.register(id("123456789012"), FeatureVector::filled(1.0)).unwrap();
        let err = s
            .register(id("123456789012"), FeatureVector::filled(2.0))
            .unwrap_err();
        assert!(matches!(err, VoteError::DuplicateIdentifier(_)));
        assert_eq!(s.len(), 1);
        assert_eq!(s.backend().saves(), 1);
    }

    #[test]
    fn test_invalid_identifier_rejected_before_mutation() {
        let mut s = store();
        let err = s.register_raw("12345", FeatureVector::filled(1.0)).unwrap_err();
        assert!(matches!(err, VoteError::InvalidIdentifier { .. }));
        assert!(s.is_empty());
        assert_eq!(s.backend().saves(), 0);
    }

    #[test]
    fn test_snapshot_parallel() {
        let mut s = store();
        s.register(id("111111111111"), FeatureVector::filled(1.0)).unwrap();
        s.register(id("222222222222"), FeatureVector::filled(2.0)).unwrap();
        let (ids, vectors) = s.snapshot();
        assert_eq!(ids, &[id("111111111111"), id("222222222222")]);
        assert_eq!(vectors[1], FeatureVector::filled(2.0));
        assert_eq!(s.distinct_identities(), 2);
    }

    #[test]
    fn test_reopen_sees_saved_entries() {
        let mut s = store();
        s.register(id("111111111111"), FeatureVector::filled(1.0)).unwrap();
        let backend = s.backend;
        let reopened = IdentityStore::open(backend).unwrap();
        assert!(reopened.is_registered(&id("111111111111")));
    }

    #[test]
    fn test_failed_save_rolls_back() {
        let mut s = IdentityStore::open(FailingBackend).unwrap();
        let err = s
            .register(id("111111111111"), FeatureVector::filled(1.0))
            .unwrap_err();
        assert!(matches!(err, VoteError::PersistenceFailure(_)));
        assert!(s.is_empty());
        assert!(!s.is_registered(&id("111111111111")));
    }

    #[test]
    fn test_registry_rejects_unequal_parts() {
        let err = Registry::from_parts(vec![id("111111111111")], vec![]).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
