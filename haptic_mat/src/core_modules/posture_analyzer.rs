// THEORY:
// The `posture_analyzer` is the analytical heart of the feedback loop. It takes the
// two hand regions of one frame and answers a single question: which way does the
// load need to shift for the weight to be shared evenly between the hands?
//
// Algorithm steps:
// 1.  **Per-hand COP**: The pressure-weighted centroid of each region, computed with
//     the general `calculate_cop` primitive.
// 2.  **Handedness resolution**: Cluster labels are arbitrary, so left and right are
//     re-derived on every frame from geometry alone. The hand whose COP has the
//     larger column is the right hand. Exact column ties fall back to the COP row
//     and then to the total load, so swapping the labels never changes the answer.
// 3.  **Actual COP**: `calculate_cop` applied to the two hand COPs, each weighted by
//     its hand's total pressure. This is where the combined load really sits.
// 4.  **Ideal COP**: The plain midpoint of the two hand COPs, where the combined load
//     would sit if both hands carried the same weight.
// 5.  **Correction**: `ideal - actual`, pointing from the current load centre toward
//     the balanced one.

use crate::core_modules::hand_clusterer::ClusterLabel;
use crate::core_modules::hand_isolator::HandRegion;
use crate::error::{MatError, Result};
use std::cmp::Ordering;
use tracing::debug;

/// A pressure-weighted centroid in mat coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterOfPressure {
    pub row: f64,
    pub column: f64,
}

impl CenterOfPressure {
    pub fn new(row: f64, column: f64) -> Self {
        Self { row, column }
    }

    /// Equal-weight midpoint of two centres.
    pub fn midpoint(a: &Self, b: &Self) -> Self {
        Self::new((a.row + b.row) / 2.0, (a.column + b.column) / 2.0)
    }
}

/// Displacement from the actual COP to the ideal COP.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CorrectionVector {
    pub d_row: f64,
    pub d_column: f64,
}

impl CorrectionVector {
    /// `ideal - actual`, component-wise.
    pub fn between(actual: &CenterOfPressure, ideal: &CenterOfPressure) -> Self {
        Self {
            d_row: ideal.row - actual.row,
            d_column: ideal.column - actual.column,
        }
    }

    pub fn magnitude(&self) -> f64 {
        self.d_row.hypot(self.d_column)
    }
}

/// Exact weighted average of `((row, column), weight)` pairs.
/// An empty set, or one whose weights sum to zero, has no centre.
pub fn calculate_cop(weighted_coords: &[((f64, f64), f64)]) -> Result<CenterOfPressure> {
    let total: f64 = weighted_coords.iter().map(|(_, w)| w).sum();
    if weighted_coords.is_empty() || total == 0.0 {
        return Err(MatError::EmptyHandRegion);
    }
    let row: f64 = weighted_coords.iter().map(|((r, _), w)| r * w).sum();
    let column: f64 = weighted_coords.iter().map(|((_, c), w)| c * w).sum();
    Ok(CenterOfPressure::new(row / total, column / total))
}

/// One hand after handedness resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct HandPosture {
    /// The cluster label this hand carried in the current frame only.
    pub label: ClusterLabel,
    pub cop: CenterOfPressure,
    pub total_pressure: f64,
    pub point_count: usize,
}

impl HandPosture {
    fn from_region(region: &HandRegion) -> Result<Self> {
        Ok(Self {
            label: region.label,
            cop: calculate_cop(&region.weighted_coords())?,
            total_pressure: region.total_pressure(),
            point_count: region.len(),
        })
    }

    /// Orders hands left to right: column first, then row, then load.
    fn lateral_cmp(&self, other: &Self) -> Ordering {
        self.cop
            .column
            .total_cmp(&other.cop.column)
            .then(self.cop.row.total_cmp(&other.cop.row))
            .then(self.total_pressure.total_cmp(&other.total_pressure))
    }
}

/// Everything the analyzer derives from one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PostureAnalysis {
    pub right: HandPosture,
    pub left: HandPosture,
    pub actual_cop: CenterOfPressure,
    pub ideal_cop: CenterOfPressure,
    pub correction: CorrectionVector,
}

/// Runs the full COP analysis over the two hand regions.
pub fn analyze_posture(regions: &[HandRegion; 2]) -> Result<PostureAnalysis> {
    let first = HandPosture::from_region(&regions[0])?;
    let second = HandPosture::from_region(&regions[1])?;

    let (right, left) = match second.lateral_cmp(&first) {
        Ordering::Greater => (second, first),
        _ => (first, second),
    };

    let actual_cop = calculate_cop(&[
        ((right.cop.row, right.cop.column), right.total_pressure),
        ((left.cop.row, left.cop.column), left.total_pressure),
    ])?;
    let ideal_cop = CenterOfPressure::midpoint(&right.cop, &left.cop);
    let correction = CorrectionVector::between(&actual_cop, &ideal_cop);

    debug!(
        right_col = right.cop.column,
        left_col = left.cop.column,
        d_row = correction.d_row,
        d_column = correction.d_column,
        "posture analysed"
    );

    Ok(PostureAnalysis {
        right,
        left,
        actual_cop,
        ideal_cop,
        correction,
    })
}
