// Visual frontend of a visual-inertial odometry pipeline: keeps a population of
// sparse point features alive across camera frames and reports, per frame,
// their pixel positions, undistorted bearings and bearing velocities.

pub mod all;
pub mod camera;
pub mod camera_kannala_brandt;
pub mod camera_pinhole;
pub mod camera_setup;
pub mod correspondence;
pub mod debug;
pub mod detector;
pub mod feature_frame;
pub mod frame;
pub mod image;
pub mod mask;
pub mod optical_flow;
pub mod outlier;
pub mod parameters;
pub mod pyramid;
pub mod replenish;
pub mod shi_tomasi;
pub mod track;
pub mod tracker;
pub mod types;
pub mod undistort;
pub mod util;
pub mod velocity;
