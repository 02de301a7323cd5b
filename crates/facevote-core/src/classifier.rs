//! Nearest-neighbor identity classifier.
//!
//! Fit on the identity store's snapshot, then resolve a probe vector to the
//! identifier that wins a majority vote among its `k` nearest samples.
//! There is deliberately no distance threshold: every probe resolves to
//! some registrant, however far away it is.

use std::collections::HashMap;

use ndarray::{Array2, ArrayView1, Axis};
use thiserror::Error;

use crate::types::{FeatureVector, Identifier};

/// Upper bound on the neighbor count.
pub const DEFAULT_MAX_NEIGHBORS: usize = 5;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("cannot fit on an empty sample set")]
    Empty,
    #[error("{vectors} vectors but {labels} labels")]
    LengthMismatch { vectors: usize, labels: usize },
    #[error("probe has {actual} dimensions, model expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("classifier used before fit")]
    NotFitted,
    #[error("shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Result of classifying a probe vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: Identifier,
    /// Neighbors among the `k` nearest that carried `label`.
    pub votes: usize,
    /// Neighbor count used for this prediction.
    pub neighbors: usize,
    /// Distance to the nearest sample carrying `label`. Informational only.
    pub distance: f32,
}

/// A trainable vector-to-identifier classifier.
pub trait Classifier {
    fn fit(&mut self, vectors: &[FeatureVector], labels: &[Identifier])
        -> Result<(), ClassifierError>;
    fn predict(&self, vector: &FeatureVector) -> Result<Prediction, ClassifierError>;
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn fit(
        &mut self,
        vectors: &[FeatureVector],
        labels: &[Identifier],
    ) -> Result<(), ClassifierError> {
        (**self).fit(vectors, labels)
    }

    fn predict(&self, vector: &FeatureVector) -> Result<Prediction, ClassifierError> {
        (**self).predict(vector)
    }
}

/// Brute-force k-nearest-neighbor classifier over Euclidean distance.
///
/// `k = min(max_neighbors, distinct labels)`, so small stores still work.
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    max_neighbors: usize,
    samples: Option<Array2<f32>>,
    labels: Vec<Identifier>,
    k: usize,
}

impl KnnClassifier {
    pub fn new(max_neighbors: usize) -> Self {
        Self {
            max_neighbors: max_neighbors.max(1),
            samples: None,
            labels: Vec::new(),
            k: 0,
        }
    }

    /// Neighbor count chosen by the last `fit`.
    pub fn neighbors(&self) -> usize {
        self.k
    }
}

impl Default for KnnClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NEIGHBORS)
    }
}

impl Classifier for KnnClassifier {
    fn fit(
        &mut self,
        vectors: &[FeatureVector],
        labels: &[Identifier],
    ) -> Result<(), ClassifierError> {
        if vectors.len() != labels.len() {
            return Err(ClassifierError::LengthMismatch {
                vectors: vectors.len(),
                labels: labels.len(),
            });
        }
        let Some(first) = vectors.first() else {
            return Err(ClassifierError::Empty);
        };
        let dim = first.as_slice().len();

        let mut flat = Vec::with_capacity(vectors.len() * dim);
        for v in vectors {
            if v.as_slice().len() != dim {
                return Err(ClassifierError::DimensionMismatch {
                    expected: dim,
                    actual: v.as_slice().len(),
                });
            }
            flat.extend_from_slice(v.as_slice());
        }

        let mut distinct: Vec<&Identifier> = labels.iter().collect();
        distinct.sort();
        distinct.dedup();

        self.k = self.max_neighbors.min(distinct.len());
        self.samples = Some(Array2::from_shape_vec((vectors.len(), dim), flat)?);
        self.labels = labels.to_vec();

        tracing::debug!(
            samples = self.labels.len(),
            identities = distinct.len(),
            k = self.k,
            "knn fitted"
        );
        Ok(())
    }

    fn predict(&self, vector: &FeatureVector) -> Result<Prediction, ClassifierError> {
        let samples = self.samples.as_ref().ok_or(ClassifierError::NotFitted)?;
        let probe = ArrayView1::from(vector.as_slice());
        if probe.len() != samples.ncols() {
            return Err(ClassifierError::DimensionMismatch {
                expected: samples.ncols(),
                actual: probe.len(),
            });
        }

        let distances = (samples - &probe)
            .mapv(|d| d * d)
            .sum_axis(Axis(1))
            .mapv(f32::sqrt);

        // Equal distances are ordered by label.
        let mut order: Vec<usize> = (0..distances.len()).collect();
        order.sort_by(|&a, &b| {
            distances[a]
                .total_cmp(&distances[b])
                .then_with(|| self.labels[a].cmp(&self.labels[b]))
        });
        let nearest = &order[..self.k];

        // label -> (votes, rank of first appearance)
        let mut tally: HashMap<&Identifier, (usize, usize)> = HashMap::new();
        for (rank, &idx) in nearest.iter().enumerate() {
            let entry = tally.entry(&self.labels[idx]).or_insert((0, rank));
            entry.0 += 1;
        }

        // Most votes wins; a tie goes to the label seen closest.
        let (label, (votes, rank)) = tally
            .into_iter()
            .max_by(|(_, (va, ra)), (_, (vb, rb))| va.cmp(vb).then(rb.cmp(ra)))
            .ok_or(ClassifierError::NotFitted)?;

        Ok(Prediction {
            label: label.clone(),
            votes,
            neighbors: self.k,
            distance: distances[nearest[rank]],
        })
    }
}
