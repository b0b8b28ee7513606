// stretch_shared: joint, trajectory and battery interfaces shared by the tools and the simulator

pub mod battery;
pub mod joint;
pub mod trajectory;

pub use battery::{BatteryInfo, BatteryMonitor};
pub use joint::{
    CalibratableJoint, JointError, JointKind, MotionLimits, MotionSample, MotorGains, TunableMotor,
};
pub use trajectory::{MotionProfile, MotionState, Trajectory, TrajectoryError, Waypoint};
