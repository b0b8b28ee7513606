// Continuous calibration while the battery drains
use std::time::Duration;
use stretch_factory::Config;
use stretch_factory::app::{self, RunOptions, RunResult};
use stretch_factory::battery::{idle_until_voltage, voltage_targets};
use stretch_factory::cli::CalibrationMode;
use stretch_shared::{CalibratableJoint, JointKind, MotionProfile};
use stretch_simulator::{SimBatteryParams, SimulatedBattery, SimulatedJoint};
use tempfile::tempdir;

#[test]
fn test_voltage_targets_step_down_to_low_voltage() {
    assert_eq!(voltage_targets(12.1, 11.0, 0.5), vec![12.0, 11.5, 11.0]);
    assert_eq!(voltage_targets(11.2, 11.0, 0.5), vec![11.0]);
}

#[tokio::test(start_paused = true)]
async fn test_idle_moves_joint_until_voltage_reached() {
    let config = Config::default();
    let mut joint = SimulatedJoint::homed(JointKind::Arm, config.simulation.joint(JointKind::Arm));
    let mut battery = SimulatedBattery::new(SimBatteryParams {
        start_voltage: 12.2,
        drain_per_read_v: 0.1,
        floor_voltage: 10.5,
    });

    let info = idle_until_voltage(
        &mut joint,
        &mut battery,
        12.0,
        &config.battery,
        Duration::from_millis(100),
        Duration::from_secs(20),
    )
    .await
    .unwrap();

    assert_eq!(info.battery_voltage, 12.0);
    // two idle moves: to the first position and back to the second
    assert!(joint.is_at_setpoint().await.unwrap());
    assert!((joint.position() - config.battery.idle_positions[1]).abs() < 0.005);
}

#[tokio::test(start_paused = true)]
async fn test_runs_once_per_voltage_step() {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.calibration.settle_time_ms = 200;
    config.calibration.output_dir = dir.path().join("runs").display().to_string();
    config.params.path = dir.path().join("params.yaml").display().to_string();
    config.battery.idle_pause_ms = 100;
    config.simulation.battery = SimBatteryParams {
        start_voltage: 12.1,
        drain_per_read_v: 0.05,
        floor_voltage: 10.5,
    };
    let mut joint = SimulatedJoint::new(JointKind::Lift, config.simulation.joint(JointKind::Lift));
    let mut battery = SimulatedBattery::new(config.simulation.battery.clone());
    let options = RunOptions {
        mode: CalibrationMode::TrajectoryEffort,
        profile: MotionProfile::Linear,
        ncycle: 1,
        skip_homing: false,
        run_until_battery_low: true,
        assume_yes: true,
    };
    let mut input: &[u8] = b"";

    let outcomes = app::run(&mut joint, &mut battery, &config, &options, &mut input)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    let voltages: Vec<f64> = outcomes.iter().map(|o| o.battery.battery_voltage).collect();
    assert!(voltages.windows(2).all(|w| w[0] > w[1]), "{voltages:?}");
    assert!(voltages[2] <= 11.0);
    assert!(outcomes.iter().all(|o| matches!(o.result, RunResult::TrajectoryEffort(_))));
}
