// End-to-end calibration runs against the simulated joints
use std::path::Path;
use stretch_factory::app::{self, RunOptions, RunResult};
use stretch_factory::calibration::{CalibrationSession, Direction, StepOutcome, Verdict};
use stretch_factory::cli::CalibrationMode;
use stretch_factory::persistence::{ParamStore, SnapshotRecorder, YamlParamStore};
use stretch_factory::{CalibrationError, Config};
use stretch_shared::{JointKind, MotionProfile};
use stretch_simulator::{SimBatteryParams, SimulatedBattery, SimulatedJoint};
use tempfile::tempdir;

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.calibration.settle_time_ms = 200;
    config.calibration.output_dir = dir.join("runs").display().to_string();
    config.params.path = dir.join("stretch_configuration_params.yaml").display().to_string();
    config.simulation.arm.max_velocity_m_s = 0.15;
    config
}

fn options(mode: CalibrationMode) -> RunOptions {
    RunOptions {
        mode,
        profile: MotionProfile::Linear,
        ncycle: 2,
        skip_homing: false,
        run_until_battery_low: false,
        assume_yes: true,
    }
}

fn json_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".json"))
        .collect()
}

fn battery() -> SimulatedBattery {
    SimulatedBattery::new(SimBatteryParams::default())
}

#[tokio::test(start_paused = true)]
async fn test_session_converges_every_profile_and_direction() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let mut joint = SimulatedJoint::homed(JointKind::Arm, config.simulation.joint(JointKind::Arm));
    let recorder = SnapshotRecorder::in_dir(dir.path().join("session"), "arm_test").unwrap();

    let report = CalibrationSession::new(&mut joint, &config, &recorder)
        .run()
        .await
        .unwrap();

    assert_eq!(report.profiles.len(), 3);
    for profile in &report.profiles {
        for state in profile.states() {
            assert!(state.is_converged(), "{} did not converge", state.label());
            assert!(state.history().len() < config.search.max_trials);
            let optimal = state.optimal().unwrap();
            assert!(optimal.is_good());
            assert!(optimal.duration() > 0.0);
        }
    }

    let limits = report.dynamic_limits();
    assert_eq!(limits.len(), 6);
    let linear_positive = limits
        .iter()
        .find(|l| l.profile == MotionProfile::Linear && l.direction == Direction::Positive)
        .unwrap();
    // the simulated arm cannot track faster than 0.15 m/s
    assert!(linear_positive.vel_m > 0.05 && linear_positive.vel_m < 0.17);
    assert!(linear_positive.accel_m.is_none());
    assert!(
        limits
            .iter()
            .filter(|l| l.profile != MotionProfile::Linear)
            .all(|l| l.accel_m.is_some())
    );

    let optimal_snapshots = std::fs::read_dir(recorder.run_dir())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.starts_with("optimal_arm_") && name.ends_with(".json")
        })
        .count();
    assert_eq!(optimal_snapshots, 6);
}

#[tokio::test(start_paused = true)]
async fn test_dynamic_limit_run_writes_parameters() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let mut joint = SimulatedJoint::new(JointKind::Arm, config.simulation.joint(JointKind::Arm));
    let mut battery = battery();
    let mut input: &[u8] = b"";

    let outcomes = app::run(
        &mut joint,
        &mut battery,
        &config,
        &options(CalibrationMode::DynamicLimits),
        &mut input,
    )
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert!(outcome.params_written);
    assert_eq!(outcome.battery.battery_voltage, 12.6);
    assert!(outcome.run_dir.join("dynamic_limits.json").exists());
    let RunResult::DynamicLimits { limits, .. } = &outcome.result else {
        panic!("expected dynamic limits");
    };

    let store = YamlParamStore::open(&config.params.path).unwrap();
    for limit in limits {
        let prefix = limit.key_prefix("arm");
        let vel = store.get(&format!("{prefix}.vel_m")).and_then(|v| v.as_f64());
        assert_eq!(vel, Some(limit.vel_m));
        assert!(store.get(&format!("{prefix}.effort_pct")).is_some());
    }
    assert!(store.get("arm.motion.trajectory_max.quintic.negative.accel_m").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_effort_sweep_run_proposes_contact_thresholds() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let mut joint = SimulatedJoint::new(JointKind::Lift, config.simulation.joint(JointKind::Lift));
    let mut battery = battery();
    let mut input: &[u8] = b"";

    let outcomes = app::run(
        &mut joint,
        &mut battery,
        &config,
        &options(CalibrationMode::TrajectoryEffort),
        &mut input,
    )
    .await
    .unwrap();

    let RunResult::TrajectoryEffort(results) = &outcomes[0].result else {
        panic!("expected an effort sweep");
    };
    assert_eq!(results.effort_pct_pos.len(), 2);
    assert_eq!(results.pos_in.len(), 2);
    assert_eq!(results.safety_stops, 0);
    let [neg, pos] = results.contact_thresh_proposed;
    assert!(neg < results.min_effort_pct_neg);
    assert!(pos > results.max_effort_pct_pos);
    assert!(outcomes[0].run_dir.join("lift_effort_sweep.json").exists());

    let store = YamlParamStore::open(&config.params.path).unwrap();
    let written = store
        .get("lift.contact_models.effort_pct.contact_thresh_default")
        .and_then(|v| v.as_sequence())
        .map(|seq| seq.iter().filter_map(|v| v.as_f64()).collect::<Vec<_>>());
    assert_eq!(written, Some(vec![neg, pos]));
}

#[tokio::test(start_paused = true)]
async fn test_unhomed_joint_is_refused_when_homing_skipped() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let mut joint = SimulatedJoint::new(JointKind::Arm, config.simulation.joint(JointKind::Arm));
    let mut battery = battery();
    let mut input: &[u8] = b"";
    let options = RunOptions {
        skip_homing: true,
        ..options(CalibrationMode::DynamicLimits)
    };

    let err = app::run(&mut joint, &mut battery, &config, &options, &mut input)
        .await
        .unwrap_err();
    assert!(matches!(err, CalibrationError::NotHomed { ref joint } if joint == "arm"));
}

#[tokio::test(start_paused = true)]
async fn test_operator_can_decline_before_motion() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let mut joint = SimulatedJoint::new(JointKind::Arm, config.simulation.joint(JointKind::Arm));
    let mut battery = battery();
    let mut input: &[u8] = b"n\n";
    let options = RunOptions {
        assume_yes: false,
        ..options(CalibrationMode::DynamicLimits)
    };

    let err = app::run(&mut joint, &mut battery, &config, &options, &mut input)
        .await
        .unwrap_err();
    assert!(matches!(err, CalibrationError::Aborted));
    assert!(!Path::new(&config.calibration.output_dir).exists());
}

#[tokio::test(start_paused = true)]
async fn test_trial_limit_stops_before_the_next_trial() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.search.max_trials = 1;
    let mut joint = SimulatedJoint::homed(JointKind::Arm, config.simulation.joint(JointKind::Arm));
    let recorder = SnapshotRecorder::in_dir(dir.path().join("session"), "arm_test").unwrap();

    let err = CalibrationSession::new(&mut joint, &config, &recorder)
        .run_profiles(&[MotionProfile::Linear])
        .await
        .unwrap_err();

    assert!(matches!(err, CalibrationError::TrialLimitExceeded { trials: 1 }));
    // one trial per direction, none past the limit
    assert_eq!(json_files(recorder.run_dir()).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_first_trial_is_still_recorded() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.targets.linear.travel_duration_start_seconds = 0.5;
    let mut joint = SimulatedJoint::homed(JointKind::Arm, config.simulation.joint(JointKind::Arm));
    let recorder = SnapshotRecorder::in_dir(dir.path().join("session"), "arm_test").unwrap();

    let err = CalibrationSession::new(&mut joint, &config, &recorder)
        .run_profiles(&[MotionProfile::Linear])
        .await
        .unwrap_err();

    assert!(matches!(err, CalibrationError::Misconfigured { duration } if duration == 0.5));
    let files = json_files(recorder.run_dir());
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("_aborted.json"), "{}", files[0]);
    let snapshot = SnapshotRecorder::load(recorder.run_dir().join(&files[0])).unwrap();
    assert_eq!(snapshot.outcome, StepOutcome::SearchAborted);
    assert_eq!(snapshot.trial.verdict(), Verdict::Bad);
    assert_eq!(snapshot.direction, Direction::Positive);
}
