// THEORY:
// The `hand_clusterer` splits the pressed cells of one frame into two groups, one
// per hand. The number of objects is known in advance (two palms on the mat), so
// it uses k-means with k fixed at 2 rather than any connectivity-based grouping;
// a palm whose contact patch breaks into islands still ends up in one cluster.
//
// Algorithm steps:
// 1.  **Features**: Each active point becomes a 2D feature (row, column). Pressure
//     is not a feature.
// 2.  **Seeding (k-means++)**: The first centroid is a uniformly random point; the
//     second is drawn with probability proportional to its squared distance from
//     the first, which keeps starting centroids spread out.
// 3.  **Lloyd iterations**: Assign every point to its nearest centroid, move each
//     centroid to the mean of its points, stop when the centroids stop moving or
//     the iteration bound is hit. A cluster that empties is re-seeded with the point
//     farthest from the other centroid.
// 4.  **Restarts**: The whole run is repeated `n_init` times from one seeded RNG and
//     the lowest-inertia result wins, so the output is reproducible.
//
// Label identity is arbitrary. Nothing downstream may assume label 0 is a
// particular hand.

use crate::config::ClusteringConfig;
use crate::core_modules::pressure_matrix::{ActivePoint, Coord};
use crate::error::{MatError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use tracing::debug;

const K: usize = 2;

/// Which of the two clusters a point belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterLabel {
    Zero,
    One,
}

impl ClusterLabel {
    pub fn index(self) -> usize {
        match self {
            ClusterLabel::Zero => 0,
            ClusterLabel::One => 1,
        }
    }

    fn from_index(index: usize) -> Self {
        if index == 0 { ClusterLabel::Zero } else { ClusterLabel::One }
    }

    /// The other label.
    pub fn flipped(self) -> Self {
        match self {
            ClusterLabel::Zero => ClusterLabel::One,
            ClusterLabel::One => ClusterLabel::Zero,
        }
    }
}

/// The result of clustering one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HandClusters {
    /// One label per input point, in input order.
    pub labels: Vec<(Coord, ClusterLabel)>,
    /// Final centroids as (row, column), indexed by `ClusterLabel::index`.
    pub centroids: [(f64, f64); K],
    /// Sum of squared distances from each point to its centroid.
    pub inertia: f64,
}

impl HandClusters {
    /// Swaps every label. Used to check that nothing depends on label order.
    pub fn flipped(&self) -> Self {
        Self {
            labels: self.labels.iter().map(|&(c, l)| (c, l.flipped())).collect(),
            centroids: [self.centroids[1], self.centroids[0]],
            inertia: self.inertia,
        }
    }

    pub fn label_of(&self, coord: Coord) -> Option<ClusterLabel> {
        self.labels.iter().find(|(c, _)| *c == coord).map(|&(_, l)| l)
    }
}

type Feature = [f64; 2];

fn distance_sq(a: &Feature, b: &Feature) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}

/// Partitions the active points into exactly two clusters by position.
pub fn cluster_hands(points: &[ActivePoint], config: &ClusteringConfig) -> Result<HandClusters> {
    let distinct: BTreeSet<Coord> = points.iter().map(|p| p.coord).collect();
    if distinct.len() < K {
        return Err(MatError::DegenerateClustering {
            active_points: distinct.len(),
        });
    }

    let features: Vec<Feature> = points
        .iter()
        .map(|p| [p.coord.row as f64, p.coord.column as f64])
        .collect();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(Vec<usize>, [Feature; K], f64)> = None;

    for _ in 0..config.n_init.max(1) {
        let seeds = seed_centroids(&features, &mut rng);
        let (assignment, centroids, inertia) = run_lloyd(&features, seeds, config);
        let improves = best.as_ref().is_none_or(|(_, _, best_inertia)| inertia < *best_inertia);
        if improves {
            best = Some((assignment, centroids, inertia));
        }
    }

    let Some((assignment, centroids, inertia)) = best else {
        return Err(MatError::DegenerateClustering {
            active_points: distinct.len(),
        });
    };

    debug!(points = points.len(), inertia, "clustered hands");

    Ok(HandClusters {
        labels: points
            .iter()
            .zip(assignment)
            .map(|(p, k)| (p.coord, ClusterLabel::from_index(k)))
            .collect(),
        centroids: centroids.map(|c| (c[0], c[1])),
        inertia,
    })
}

/// k-means++ seeding for two centroids.
fn seed_centroids(features: &[Feature], rng: &mut StdRng) -> [Feature; K] {
    let first = features[rng.random_range(0..features.len())];

    let weights: Vec<f64> = features.iter().map(|f| distance_sq(f, &first)).collect();
    let total: f64 = weights.iter().sum();

    let mut target = rng.random::<f64>() * total;
    let mut second = first;
    for (feature, weight) in features.iter().zip(&weights) {
        if *weight <= 0.0 {
            continue;
        }
        second = *feature;
        if target < *weight {
            break;
        }
        target -= weight;
    }

    [first, second]
}

fn nearest(feature: &Feature, centroids: &[Feature; K]) -> usize {
    // Ties go to the lower index.
    if distance_sq(feature, &centroids[1]) < distance_sq(feature, &centroids[0]) { 1 } else { 0 }
}

/// Assigns every point to its nearest centroid and re-seeds an empty cluster.
fn assign(features: &[Feature], centroids: &[Feature; K]) -> Vec<usize> {
    let mut assignment: Vec<usize> = features.iter().map(|f| nearest(f, centroids)).collect();

    for k in 0..K {
        if assignment.iter().any(|&a| a == k) {
            continue;
        }
        let other = 1 - k;
        let farthest = features
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                distance_sq(a, &centroids[other]).total_cmp(&distance_sq(b, &centroids[other]))
            })
            .map(|(i, _)| i);
        if let Some(i) = farthest {
            assignment[i] = k;
        }
    }
    assignment
}

fn means(features: &[Feature], assignment: &[usize], previous: &[Feature; K]) -> [Feature; K] {
    let mut sums = [[0.0f64; 2]; K];
    let mut counts = [0usize; K];
    for (feature, &k) in features.iter().zip(assignment) {
        sums[k][0] += feature[0];
        sums[k][1] += feature[1];
        counts[k] += 1;
    }
    let mut centroids = *previous;
    for k in 0..K {
        if counts[k] > 0 {
            centroids[k] = [sums[k][0] / counts[k] as f64, sums[k][1] / counts[k] as f64];
        }
    }
    centroids
}

fn run_lloyd(
    features: &[Feature],
    seeds: [Feature; K],
    config: &ClusteringConfig,
) -> (Vec<usize>, [Feature; K], f64) {
    let mut centroids = seeds;
    let mut assignment = assign(features, &centroids);

    for _ in 0..config.max_iter {
        let updated = means(features, &assignment, &centroids);
        let shift: f64 = (0..K).map(|k| distance_sq(&updated[k], &centroids[k])).sum();
        centroids = updated;
        assignment = assign(features, &centroids);
        if shift <= config.tolerance {
            break;
        }
    }

    // Centroids must describe the final assignment.
    centroids = means(features, &assignment, &centroids);
    let inertia = features
        .iter()
        .zip(&assignment)
        .map(|(f, &k)| distance_sq(f, &centroids[k]))
        .sum();

    (assignment, centroids, inertia)
}
