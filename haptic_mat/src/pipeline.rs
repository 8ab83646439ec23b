// THEORY:
// The `pipeline` module is the top-level API of the analysis stack. It chains the
// pure stages (cluster -> isolate -> analyze -> select) behind two calls:
// `compute_actuator_flags` for a single matrix, and `generate_report` for a whole
// cycle's reading, which also applies the skip policy.
//
// The only thing the pipeline remembers between cycles is the last valid actuator
// selection, and only the `HoldLast` skip policy ever reads it.

use crate::config::{ClusteringConfig, FeedbackConfig, MatConfig, SkipPolicy};
use crate::core_modules::actuator_selector::{ActuatorFlags, actuators_for};
use crate::core_modules::frame_decoder::MatReading;
use crate::core_modules::hand_clusterer::cluster_hands;
use crate::core_modules::hand_isolator::isolate_hands;
use crate::core_modules::posture_analyzer::{PostureAnalysis, analyze_posture};
use crate::core_modules::pressure_matrix::PressureMatrix;
use crate::error::{MatError, Result};
use tracing::{debug, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::posture_analyzer::{CenterOfPressure, CorrectionVector};

/// Why a cycle produced no analysis.
#[derive(Debug)]
pub enum SkipReason {
    /// The mat had no frame ready.
    NoData,
    /// The frame or its analysis was rejected; the error is always recoverable.
    Rejected(MatError),
}

/// The outcome of one cycle.
#[derive(Debug)]
pub enum CycleReport {
    Corrected {
        analysis: PostureAnalysis,
        flags: ActuatorFlags,
    },
    Skipped {
        reason: SkipReason,
        flags: ActuatorFlags,
    },
}

impl CycleReport {
    /// The flags to hand to the actuation transport for this cycle.
    pub fn flags(&self) -> ActuatorFlags {
        match self {
            CycleReport::Corrected { flags, .. } | CycleReport::Skipped { flags, .. } => *flags,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleReport::Skipped { .. })
    }
}

/// Matrix -> actuator flags.
pub struct PosturePipeline {
    clustering: ClusteringConfig,
    feedback: FeedbackConfig,
    last_flags: ActuatorFlags,
}

impl PosturePipeline {
    pub fn new(clustering: ClusteringConfig, feedback: FeedbackConfig) -> Self {
        Self {
            clustering,
            feedback,
            last_flags: ActuatorFlags::neutral(),
        }
    }

    pub fn from_config(config: &MatConfig) -> Self {
        Self::new(config.clustering.clone(), config.feedback.clone())
    }

    /// Cluster, isolate and analyze one matrix.
    pub fn analyze(&self, matrix: &PressureMatrix) -> Result<PostureAnalysis> {
        let clusters = cluster_hands(&matrix.active_points(), &self.clustering)?;
        let regions = isolate_hands(matrix, &clusters);
        analyze_posture(&regions)
    }

    pub fn compute_actuator_flags(&self, matrix: &PressureMatrix) -> Result<ActuatorFlags> {
        let analysis = self.analyze(matrix)?;
        Ok(actuators_for(&analysis.correction, self.feedback.column_dead_band))
    }

    /// Turns one cycle's reading into a report. Recoverable failures become a
    /// skipped cycle; anything else is returned as an error.
    pub fn generate_report(&mut self, reading: Result<MatReading>) -> Result<CycleReport> {
        let matrix = match reading {
            Ok(MatReading::Frame(matrix)) => matrix,
            Ok(MatReading::NoData) => return Ok(self.skip(SkipReason::NoData)),
            Err(err) if err.is_recoverable() => return Ok(self.skip(SkipReason::Rejected(err))),
            Err(err) => return Err(err),
        };

        match self.analyze(&matrix) {
            Ok(analysis) => {
                let flags = actuators_for(&analysis.correction, self.feedback.column_dead_band);
                debug!(%flags, "cycle corrected");
                self.last_flags = flags;
                Ok(CycleReport::Corrected { analysis, flags })
            }
            Err(err) if err.is_recoverable() => Ok(self.skip(SkipReason::Rejected(err))),
            Err(err) => Err(err),
        }
    }

    fn skip(&self, reason: SkipReason) -> CycleReport {
        let flags = match self.feedback.skip_policy {
            SkipPolicy::Neutral => ActuatorFlags::neutral(),
            SkipPolicy::HoldLast => self.last_flags,
        };
        match &reason {
            SkipReason::NoData => debug!(%flags, "cycle skipped: no data"),
            SkipReason::Rejected(err) => warn!(%err, %flags, "cycle skipped"),
        }
        CycleReport::Skipped { reason, flags }
    }

    pub fn last_flags(&self) -> ActuatorFlags {
        self.last_flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn pipeline(policy: SkipPolicy) -> PosturePipeline {
        let feedback = FeedbackConfig {
            skip_policy: policy,
            ..FeedbackConfig::default()
        };
        PosturePipeline::new(ClusteringConfig::default(), feedback)
    }

    fn thumb_side_matrix() -> PressureMatrix {
        PressureMatrix::from_points(&[(1, 0, 1), (1, 2, 2)]).unwrap()
    }

    #[test]
    fn three_by_three_scenario_fires_thumb_and_wrist() {
        let pipeline = pipeline(SkipPolicy::Neutral);
        let analysis = pipeline.analyze(&thumb_side_matrix()).unwrap();
        assert_eq!(analysis.right.cop, CenterOfPressure::new(1.0, 2.0));
        assert_eq!(analysis.left.cop, CenterOfPressure::new(1.0, 0.0));
        assert_eq!(analysis.actual_cop, CenterOfPressure::new(1.0, 4.0 / 3.0));
        assert_eq!(analysis.ideal_cop, CenterOfPressure::new(1.0, 1.0));
        assert_eq!(
            analysis.correction,
            CorrectionVector { d_row: 0.0, d_column: 1.0 - 4.0 / 3.0 }
        );

        let flags = pipeline.compute_actuator_flags(&thumb_side_matrix()).unwrap();
        assert_eq!(
            flags,
            ActuatorFlags { index: false, pinky: false, wrist: true, thumb: true }
        );
    }

    #[test]
    fn heavier_left_hand_fires_index_and_pinky() {
        let matrix = PressureMatrix::from_points(&[(1, 0, 2), (1, 2, 1)]).unwrap();
        let flags = pipeline(SkipPolicy::Neutral).compute_actuator_flags(&matrix).unwrap();
        assert!(flags.index && flags.pinky && !flags.thumb && !flags.wrist);
    }

    #[test]
    fn single_point_is_degenerate() {
        let matrix = PressureMatrix::from_points(&[(4, 4, 9)]).unwrap();
        assert!(matches!(
            pipeline(SkipPolicy::Neutral).compute_actuator_flags(&matrix),
            Err(MatError::DegenerateClustering { active_points: 1 })
        ));
    }

    #[test]
    fn neutral_policy_resets_on_skip() {
        let mut pipeline = pipeline(SkipPolicy::Neutral);
        let report = pipeline
            .generate_report(Ok(MatReading::Frame(thumb_side_matrix())))
            .unwrap();
        assert!(report.flags().thumb);

        let report = pipeline.generate_report(Ok(MatReading::NoData)).unwrap();
        assert!(report.is_skipped());
        assert!(report.flags().is_neutral());
    }

    #[test]
    fn hold_last_policy_repeats_previous_flags() {
        let mut pipeline = pipeline(SkipPolicy::HoldLast);

        let first = pipeline.generate_report(Ok(MatReading::NoData)).unwrap();
        assert!(first.flags().is_neutral());

        let corrected = pipeline
            .generate_report(Ok(MatReading::Frame(thumb_side_matrix())))
            .unwrap();
        let held = pipeline
            .generate_report(Ok(MatReading::Frame(PressureMatrix::new())))
            .unwrap();
        assert!(matches!(
            held,
            CycleReport::Skipped {
                reason: SkipReason::Rejected(MatError::DegenerateClustering { .. }),
                ..
            }
        ));
        assert_eq!(held.flags(), corrected.flags());
        assert_eq!(pipeline.last_flags(), corrected.flags());

        let incomplete = Err(MatError::IncompleteFrame { expected: 9, received: 2 });
        assert_eq!(pipeline.generate_report(incomplete).unwrap().flags(), corrected.flags());
    }

    #[test]
    fn device_errors_are_not_skipped() {
        let mut pipeline = pipeline(SkipPolicy::HoldLast);
        let reading = Err(MatError::Device(io::Error::new(io::ErrorKind::NotFound, "gone")));
        assert!(matches!(pipeline.generate_report(reading), Err(MatError::Device(_))));
    }

    #[test]
    fn dead_band_applies_to_reports() {
        let feedback = FeedbackConfig {
            column_dead_band: 1.0,
            ..FeedbackConfig::default()
        };
        let mut pipeline = PosturePipeline::new(ClusteringConfig::default(), feedback);
        let report = pipeline
            .generate_report(Ok(MatReading::Frame(thumb_side_matrix())))
            .unwrap();
        assert!(!report.is_skipped());
        assert!(report.flags().is_neutral());
    }
}
