//! Simulated Stretch hardware for running the calibration tools without a robot.
//!
//! Joints integrate a simple tracking controller on a fixed 2 ms step, driven by the
//! tokio clock, so tests can run whole calibration sessions under paused time.

pub mod battery;
pub mod joint;

pub use battery::{SimBatteryParams, SimulatedBattery};
pub use joint::{RunstopHandle, SimJointParams, SimulatedJoint};
