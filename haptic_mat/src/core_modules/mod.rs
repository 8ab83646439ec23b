pub mod actuator_selector;
pub mod frame_decoder;
pub mod hand_clusterer;
pub mod hand_isolator;
pub mod mat_device;
pub mod posture_analyzer;
pub mod pressure_matrix;
