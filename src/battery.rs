// src/battery.rs - Continuous calibration across a draining battery
use crate::calibration::executor::move_and_wait;
use crate::config::BatteryConfig;
use crate::error::CalibrationError;
use std::time::Duration;
use stretch_shared::{BatteryInfo, BatteryMonitor, CalibratableJoint};

/// Voltages at which to run a calibration, highest first.
///
/// Starts at `low` and climbs by `step` while still below `current`; the caller walks the
/// list from the top as the pack drains.
pub fn voltage_targets(current: f64, low: f64, step: f64) -> Vec<f64> {
    let mut targets = Vec::new();
    if step <= 0.0 {
        return targets;
    }
    let mut voltage = low;
    while voltage < current {
        targets.push((voltage * 100.0).round() / 100.0);
        voltage += step;
    }
    targets.reverse();
    targets
}

/// Shuttle the joint between the idle positions until the pack falls to `target` volts.
///
/// Returns the reading that ended the wait.
pub async fn idle_until_voltage<J, B>(
    joint: &mut J,
    battery: &mut B,
    target: f64,
    config: &BatteryConfig,
    poll: Duration,
    timeout: Duration,
) -> Result<BatteryInfo, CalibrationError>
where
    J: CalibratableJoint + ?Sized,
    B: BatteryMonitor + ?Sized,
{
    let (min, max) = joint.trajectory_range();
    let positions = config.idle_positions.map(|p| p.clamp(min, max));
    let pause = Duration::from_millis(config.idle_pause_ms);

    let mut next = 0;
    loop {
        let info = BatteryInfo::read(battery).await?;
        if info.battery_voltage <= target {
            tracing::info!(target_voltage = target, "{info}");
            return Ok(info);
        }
        tracing::debug!(target_voltage = target, "Idling: {info}");
        move_and_wait(joint, positions[next], poll, timeout).await?;
        next = 1 - next;
        tokio::time::sleep(pause).await;
    }
}
