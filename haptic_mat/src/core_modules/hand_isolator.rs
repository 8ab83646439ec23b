// THEORY:
// The `hand_isolator` turns cluster labels back into pressure data. Its output is a
// pair of `HandRegion`s, each a self-contained record of one palm in one frame.
//
// The two regions always form a total partition of the labelled points: every
// point lands in exactly one region and none is dropped or duplicated.

use crate::core_modules::hand_clusterer::{ClusterLabel, HandClusters};
use crate::core_modules::pressure_matrix::{ActivePoint, Coord, PressureMatrix};

/// The pressed cells attributed to one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandRegion {
    pub label: ClusterLabel,
    pub points: Vec<ActivePoint>,
}

impl HandRegion {
    pub fn new(label: ClusterLabel) -> Self {
        Self {
            label,
            points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, coord: Coord) -> Option<u16> {
        self.points.iter().find(|p| p.coord == coord).map(|p| p.pressure)
    }

    pub fn contains(&self, coord: Coord) -> bool {
        self.get(coord).is_some()
    }

    pub fn total_pressure(&self) -> f64 {
        self.points.iter().map(|p| p.pressure as f64).sum()
    }

    /// `((row, column), pressure)` pairs, the input shape of `calculate_cop`.
    pub fn weighted_coords(&self) -> Vec<((f64, f64), f64)> {
        self.points
            .iter()
            .map(|p| ((p.coord.row as f64, p.coord.column as f64), p.pressure as f64))
            .collect()
    }
}

/// Splits the matrix's pressed cells by cluster label. `clusters` must come from
/// this matrix's active points; labelled cells that read zero are not active
/// and are left out.
pub fn isolate_hands(matrix: &PressureMatrix, clusters: &HandClusters) -> [HandRegion; 2] {
    let mut regions = [HandRegion::new(ClusterLabel::Zero), HandRegion::new(ClusterLabel::One)];
    for &(coord, label) in &clusters.labels {
        match matrix.get(coord.row, coord.column) {
            Some(pressure) if pressure > 0 => {
                regions[label.index()].points.push(ActivePoint { coord, pressure });
            }
            _ => {}
        }
    }
    regions
}
