// src/trajectory.rs
/// Waypoint trajectories executed by trajectory-mode joints.
///
/// A trajectory is an ordered list of `(t, x, v?, a?)` waypoints. The profile decides how
/// the controller interpolates between them: piecewise linear for position-only
/// waypoints, cubic Hermite when velocities are given, quintic Hermite when
/// accelerations are given as well.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrajectoryError {
    #[error("trajectory has no waypoints")]
    Empty,
    #[error("waypoint {index} is not later than the waypoint before it")]
    NonMonotonic { index: usize },
    #[error("trajectory duration must be positive")]
    NonPositiveDuration,
    #[error("trajectory start and goal positions are identical")]
    ZeroTravel,
}

/// Interpolation order used between waypoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionProfile {
    /// Position-only waypoints, constant velocity per segment
    Linear,

    /// Position and velocity waypoints
    Cubic,

    /// Position, velocity and acceleration waypoints
    Quintic,
}

impl MotionProfile {
    /// Calibration order.
    pub const ALL: [MotionProfile; 3] = [
        MotionProfile::Linear,
        MotionProfile::Cubic,
        MotionProfile::Quintic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MotionProfile::Linear => "linear",
            MotionProfile::Cubic => "cubic",
            MotionProfile::Quintic => "quintic",
        }
    }

    pub fn uses_velocity(&self) -> bool {
        !matches!(self, MotionProfile::Linear)
    }

    pub fn uses_acceleration(&self) -> bool {
        matches!(self, MotionProfile::Quintic)
    }

    /// Peak velocity of a rest-to-rest move as a multiple of `range / duration`.
    pub fn peak_velocity_factor(&self) -> f64 {
        match self {
            MotionProfile::Linear => 1.0,
            MotionProfile::Cubic => 1.5,
            MotionProfile::Quintic => 1.875,
        }
    }

    /// Peak acceleration of a rest-to-rest move as a multiple of `range / duration²`.
    ///
    /// Linear segments switch velocity instantaneously, so there is no finite peak.
    pub fn peak_acceleration_factor(&self) -> Option<f64> {
        match self {
            MotionProfile::Linear => None,
            MotionProfile::Cubic => Some(6.0),
            MotionProfile::Quintic => Some(10.0 / 3f64.sqrt()),
        }
    }
}

impl fmt::Display for MotionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MotionProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(MotionProfile::Linear),
            "cubic" => Ok(MotionProfile::Cubic),
            "quintic" => Ok(MotionProfile::Quintic),
            other => Err(format!(
                "unknown motion profile '{other}' (expected linear, cubic or quintic)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Time from trajectory start (s)
    pub t_s: f64,

    /// Position (m)
    pub x_m: f64,

    /// Velocity (m/s), cubic and quintic only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v_m: Option<f64>,

    /// Acceleration (m/s²), quintic only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a_m: Option<f64>,
}

/// Motion state at a specific time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionState {
    /// Time since start of trajectory (seconds)
    pub time: f64,

    /// Position at this time (m)
    pub position: f64,

    /// Velocity at this time (m/s)
    pub velocity: f64,

    /// Acceleration at this time (m/s²)
    pub acceleration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    profile: MotionProfile,
    waypoints: Vec<Waypoint>,
}

impl Trajectory {
    /// Wrap waypoints without checking them. Call [`Trajectory::validate`] before execution.
    pub fn new(profile: MotionProfile, waypoints: Vec<Waypoint>) -> Self {
        Self { profile, waypoints }
    }

    /// Two-waypoint rest-to-rest move from `start` to `goal` taking `duration` seconds.
    pub fn spanning(
        start: f64,
        goal: f64,
        duration: f64,
        profile: MotionProfile,
    ) -> Result<Self, TrajectoryError> {
        let rest_v = profile.uses_velocity().then_some(0.0);
        let rest_a = profile.uses_acceleration().then_some(0.0);
        let trajectory = Self::new(
            profile,
            vec![
                Waypoint {
                    t_s: 0.0,
                    x_m: start,
                    v_m: rest_v,
                    a_m: rest_a,
                },
                Waypoint {
                    t_s: duration,
                    x_m: goal,
                    v_m: rest_v,
                    a_m: rest_a,
                },
            ],
        );
        trajectory.validate()?;
        Ok(trajectory)
    }

    pub fn validate(&self) -> Result<(), TrajectoryError> {
        let (Some(first), Some(last)) = (self.waypoints.first(), self.waypoints.last()) else {
            return Err(TrajectoryError::Empty);
        };
        for (index, pair) in self.waypoints.windows(2).enumerate() {
            if pair[1].t_s <= pair[0].t_s {
                return Err(TrajectoryError::NonMonotonic { index: index + 1 });
            }
        }
        if last.t_s - first.t_s <= 0.0 {
            return Err(TrajectoryError::NonPositiveDuration);
        }
        if (last.x_m - first.x_m).abs() < f64::EPSILON {
            return Err(TrajectoryError::ZeroTravel);
        }
        Ok(())
    }

    pub fn profile(&self) -> MotionProfile {
        self.profile
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn start(&self) -> Option<&Waypoint> {
        self.waypoints.first()
    }

    pub fn goal(&self) -> Option<&Waypoint> {
        self.waypoints.last()
    }

    /// Seconds between the first and last waypoint (0 when empty).
    pub fn duration(&self) -> f64 {
        match (self.start(), self.goal()) {
            (Some(first), Some(last)) => last.t_s - first.t_s,
            _ => 0.0,
        }
    }

    /// Absolute distance between start and goal (m).
    pub fn travel_range(&self) -> f64 {
        match (self.start(), self.goal()) {
            (Some(first), Some(last)) => (last.x_m - first.x_m).abs(),
            _ => 0.0,
        }
    }

    /// Reference state at `time` seconds after the trajectory starts.
    ///
    /// Times before the first or after the last waypoint hold the end position at rest.
    pub fn state_at(&self, time: f64) -> MotionState {
        let (Some(first), Some(last)) = (self.start(), self.goal()) else {
            return MotionState {
                time,
                position: 0.0,
                velocity: 0.0,
                acceleration: 0.0,
            };
        };
        let at_rest = |w: &Waypoint| MotionState {
            time,
            position: w.x_m,
            velocity: 0.0,
            acceleration: 0.0,
        };
        let t = first.t_s + time;
        if t <= first.t_s {
            return at_rest(first);
        }
        if t >= last.t_s {
            return at_rest(last);
        }

        let segment = self
            .waypoints
            .windows(2)
            .find(|pair| t <= pair[1].t_s)
            .unwrap_or(&self.waypoints[self.waypoints.len() - 2..]);
        let (w0, w1) = (&segment[0], &segment[1]);
        let h = w1.t_s - w0.t_s;
        let s = (t - w0.t_s) / h;

        let (position, velocity, acceleration) = match self.profile {
            MotionProfile::Linear => (w0.x_m + (w1.x_m - w0.x_m) * s, (w1.x_m - w0.x_m) / h, 0.0),
            MotionProfile::Cubic => cubic_hermite(w0, w1, h, s),
            MotionProfile::Quintic => quintic_hermite(w0, w1, h, s),
        };
        MotionState {
            time,
            position,
            velocity,
            acceleration,
        }
    }
}

fn cubic_hermite(w0: &Waypoint, w1: &Waypoint, h: f64, s: f64) -> (f64, f64, f64) {
    let (p0, p1) = (w0.x_m, w1.x_m);
    let (m0, m1) = (w0.v_m.unwrap_or(0.0) * h, w1.v_m.unwrap_or(0.0) * h);
    let (s2, s3) = (s * s, s * s * s);

    let position = (2.0 * s3 - 3.0 * s2 + 1.0) * p0
        + (s3 - 2.0 * s2 + s) * m0
        + (-2.0 * s3 + 3.0 * s2) * p1
        + (s3 - s2) * m1;
    let velocity = ((6.0 * s2 - 6.0 * s) * p0
        + (3.0 * s2 - 4.0 * s + 1.0) * m0
        + (-6.0 * s2 + 6.0 * s) * p1
        + (3.0 * s2 - 2.0 * s) * m1)
        / h;
    let acceleration = ((12.0 * s - 6.0) * p0
        + (6.0 * s - 4.0) * m0
        + (-12.0 * s + 6.0) * p1
        + (6.0 * s - 2.0) * m1)
        / (h * h);
    (position, velocity, acceleration)
}

fn quintic_hermite(w0: &Waypoint, w1: &Waypoint, h: f64, s: f64) -> (f64, f64, f64) {
    let (p0, p1) = (w0.x_m, w1.x_m);
    let (v0, v1) = (w0.v_m.unwrap_or(0.0) * h, w1.v_m.unwrap_or(0.0) * h);
    let (a0, a1) = (w0.a_m.unwrap_or(0.0) * h * h, w1.a_m.unwrap_or(0.0) * h * h);
    let (s2, s3, s4, s5) = (s * s, s.powi(3), s.powi(4), s.powi(5));

    let basis = [
        1.0 - 10.0 * s3 + 15.0 * s4 - 6.0 * s5,
        s - 6.0 * s3 + 8.0 * s4 - 3.0 * s5,
        0.5 * s2 - 1.5 * s3 + 1.5 * s4 - 0.5 * s5,
        0.5 * s3 - s4 + 0.5 * s5,
        -4.0 * s3 + 7.0 * s4 - 3.0 * s5,
        10.0 * s3 - 15.0 * s4 + 6.0 * s5,
    ];
    let first = [
        -30.0 * s2 + 60.0 * s3 - 30.0 * s4,
        1.0 - 18.0 * s2 + 32.0 * s3 - 15.0 * s4,
        s - 4.5 * s2 + 6.0 * s3 - 2.5 * s4,
        1.5 * s2 - 4.0 * s3 + 2.5 * s4,
        -12.0 * s2 + 28.0 * s3 - 15.0 * s4,
        30.0 * s2 - 60.0 * s3 + 30.0 * s4,
    ];
    let second = [
        -60.0 * s + 180.0 * s2 - 120.0 * s3,
        -36.0 * s + 96.0 * s2 - 60.0 * s3,
        1.0 - 9.0 * s + 18.0 * s2 - 10.0 * s3,
        3.0 * s - 12.0 * s2 + 10.0 * s3,
        -24.0 * s + 84.0 * s2 - 60.0 * s3,
        60.0 * s - 180.0 * s2 + 120.0 * s3,
    ];
    let coefficients = [p0, v0, a0, a1, v1, p1];
    let combine = |weights: &[f64; 6]| -> f64 {
        weights.iter().zip(coefficients.iter()).map(|(w, c)| w * c).sum()
    };
    (combine(&basis), combine(&first) / h, combine(&second) / (h * h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn spanning_sets_rest_constraints_per_profile() {
        let linear = Trajectory::spanning(0.1, 0.5, 4.0, MotionProfile::Linear).unwrap();
        assert_eq!(linear.waypoints()[0].v_m, None);
        let cubic = Trajectory::spanning(0.1, 0.5, 4.0, MotionProfile::Cubic).unwrap();
        assert_eq!(cubic.waypoints()[1].v_m, Some(0.0));
        assert_eq!(cubic.waypoints()[1].a_m, None);
        let quintic = Trajectory::spanning(0.1, 0.5, 4.0, MotionProfile::Quintic).unwrap();
        assert_eq!(quintic.waypoints()[0].a_m, Some(0.0));
        assert!(close(quintic.duration(), 4.0));
        assert!(close(quintic.travel_range(), 0.4));
    }

    #[test]
    fn validate_rejects_malformed_trajectories() {
        let empty = Trajectory::new(MotionProfile::Linear, vec![]);
        assert_eq!(empty.validate(), Err(TrajectoryError::Empty));

        let waypoint = |t_s, x_m| Waypoint {
            t_s,
            x_m,
            v_m: None,
            a_m: None,
        };
        let backwards = Trajectory::new(
            MotionProfile::Linear,
            vec![waypoint(0.0, 0.0), waypoint(2.0, 0.2), waypoint(1.0, 0.3)],
        );
        assert_eq!(backwards.validate(), Err(TrajectoryError::NonMonotonic { index: 2 }));

        let single = Trajectory::new(MotionProfile::Linear, vec![waypoint(0.0, 0.1)]);
        assert_eq!(single.validate(), Err(TrajectoryError::NonPositiveDuration));

        assert_eq!(
            Trajectory::spanning(0.3, 0.3, 2.0, MotionProfile::Cubic),
            Err(TrajectoryError::ZeroTravel)
        );
        assert_eq!(
            Trajectory::spanning(0.1, 0.3, 0.0, MotionProfile::Cubic),
            Err(TrajectoryError::NonPositiveDuration)
        );
    }

    #[test]
    fn profiles_reach_their_endpoints() {
        for profile in MotionProfile::ALL {
            let trajectory = Trajectory::spanning(0.1, 0.5, 2.0, profile).unwrap();
            assert!(close(trajectory.state_at(0.0).position, 0.1));
            assert!(close(trajectory.state_at(2.0).position, 0.5));
            assert!(close(trajectory.state_at(1.0).position, 0.3));
            assert!(close(trajectory.state_at(5.0).velocity, 0.0));
        }
    }

    #[test]
    fn peak_velocity_matches_profile_factor() {
        let (range, duration) = (0.4, 2.0);
        for profile in MotionProfile::ALL {
            let trajectory = Trajectory::spanning(0.1, 0.1 + range, duration, profile).unwrap();
            let peak = trajectory.state_at(duration / 2.0).velocity;
            assert!(close(peak, profile.peak_velocity_factor() * range / duration));
        }
    }

    #[test]
    fn peak_acceleration_matches_profile_factor() {
        let (range, duration) = (0.4, 2.0);
        let cubic = Trajectory::spanning(0.0, range, duration, MotionProfile::Cubic).unwrap();
        let at_start = cubic.state_at(1e-9).acceleration;
        assert!((at_start - 6.0 * range / (duration * duration)).abs() < 1e-6);

        let quintic = Trajectory::spanning(0.0, range, duration, MotionProfile::Quintic).unwrap();
        let s_peak = (3.0 - 3f64.sqrt()) / 6.0;
        let peak = quintic.state_at(s_peak * duration).acceleration;
        let expected = MotionProfile::Quintic.peak_acceleration_factor().unwrap() * range
            / (duration * duration);
        assert!((peak - expected).abs() < 1e-9);
    }

    #[test]
    fn profile_parses_from_cli_text() {
        assert_eq!("Quintic".parse::<MotionProfile>(), Ok(MotionProfile::Quintic));
        assert!("trapezoidal".parse::<MotionProfile>().is_err());
    }
}
