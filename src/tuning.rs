// src/tuning.rs - Interactive position-controller tuning
//
// A background task owns the motor and cycles it between two targets. The console parses
// operator commands and publishes each new `TuningSnapshot` over a watch channel; the
// cycle task picks up the latest one at the start of every cycle.
use crate::persistence::{ParamStore, PersistenceError};
use std::time::Duration;
use stretch_shared::{JointError, MotionLimits, MotorGains, TunableMotor};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;

/// Status pulls per cycle
pub const TICKS_PER_CYCLE: u32 = 50;

#[derive(Debug, Error)]
pub enum TuningError {
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
    #[error("Invalid value '{value}' for '{key}'")]
    InvalidValue { key: char, value: String },
    #[error("Cycle rate must be positive, got {0}")]
    NonPositiveRate(f64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Everything the cycle task needs for one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct TuningSnapshot {
    pub gains: MotorGains,
    pub limits: MotionLimits,
    pub cycle_rate_hz: f64,
    pub targets: [f64; 2],
}

impl TuningSnapshot {
    pub fn new(gains: MotorGains, limits: MotionLimits, targets: [f64; 2]) -> Self {
        Self {
            gains,
            limits,
            cycle_rate_hz: 0.3,
            targets,
        }
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.cycle_rate_hz)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Update(TuningSnapshot),
    ShowMenu,
    WriteGains,
    Quit,
    Ignored,
}

/// Parse one console line against the current snapshot.
///
/// Commands are a key letter followed directly by a value (`p8.5`, `A0.15`). A bare `m`
/// shows the menu; `m` with a value sets the phase advance.
pub fn parse_command(current: &TuningSnapshot, line: &str) -> Result<ConsoleCommand, TuningError> {
    let line = line.trim();
    let mut chars = line.chars();
    let Some(key) = chars.next() else {
        return Ok(ConsoleCommand::Ignored);
    };
    let rest = chars.as_str().trim();

    if rest.is_empty() {
        return match key {
            'm' => Ok(ConsoleCommand::ShowMenu),
            'w' => Ok(ConsoleCommand::WriteGains),
            'q' => Ok(ConsoleCommand::Quit),
            _ => Err(TuningError::UnknownCommand(line.to_string())),
        };
    }

    let value: f64 = rest.parse().map_err(|_| TuningError::InvalidValue {
        key,
        value: rest.to_string(),
    })?;
    let mut next = current.clone();
    match key {
        'p' => next.gains.pos_kp = value,
        'i' => next.gains.pos_ki = value,
        'd' => next.gains.pos_kd = value,
        'l' => next.gains.pos_ki_limit = value,
        'z' => next.gains.pos_lpf = value,
        'm' => next.gains.phase_advance = value,
        'j' => next.gains.i_max_pos = value,
        'k' => next.gains.i_max_neg = value,
        'v' => next.limits.vel_m = value,
        'a' => next.limits.accel_m = value,
        's' => next.limits.stiffness = value,
        'f' => next.limits.i_feedforward = value,
        'r' => {
            if value <= 0.0 {
                return Err(TuningError::NonPositiveRate(value));
            }
            next.cycle_rate_hz = value;
        }
        'A' => next.targets[0] = value,
        'B' => next.targets[1] = value,
        _ => return Err(TuningError::UnknownCommand(line.to_string())),
    }
    Ok(ConsoleCommand::Update(next))
}

pub fn menu(snapshot: &TuningSnapshot) -> String {
    let g = &snapshot.gains;
    let l = &snapshot.limits;
    [
        "--------------".to_string(),
        "m : menu".to_string(),
        format!("p : set pKp_d : curr : {}", g.pos_kp),
        format!("i : set pKi_d : curr : {}", g.pos_ki),
        format!("d : set pKd_d : curr : {}", g.pos_kd),
        format!("l : set pKi_limit : curr : {}", g.pos_ki_limit),
        format!("z : set pLPF : curr : {}", g.pos_lpf),
        format!("v : set vel : curr : {}", l.vel_m),
        format!("a : set accel : curr : {}", l.accel_m),
        format!("s : set stiffness : curr : {}", l.stiffness),
        format!("f : set i_feedforward : curr : {}", l.i_feedforward),
        format!("m : set phase advance : curr : {}", g.phase_advance),
        format!("j : set iMax_pos : curr : {}", g.i_max_pos),
        format!("k : set iMax_neg : curr : {}", g.i_max_neg),
        format!("r : set cycle rate (Hz) : curr : {}", snapshot.cycle_rate_hz),
        format!("A : set target A : curr : {}", snapshot.targets[0]),
        format!("B : set target B : curr : {}", snapshot.targets[1]),
        "w : write gains to YAML".to_string(),
        "q : quit".to_string(),
    ]
    .join("\n")
}

/// Write the current gains under `<joint>.gains`.
pub fn write_gains<S: ParamStore + ?Sized>(
    joint: &str,
    gains: &MotorGains,
    store: &mut S,
) -> Result<(), PersistenceError> {
    let entries = [
        ("pKp_d", gains.pos_kp),
        ("pKi_d", gains.pos_ki),
        ("pKd_d", gains.pos_kd),
        ("pKi_limit", gains.pos_ki_limit),
        ("pLPF", gains.pos_lpf),
        ("phase_advance_d", gains.phase_advance),
        ("iMax_pos", gains.i_max_pos),
        ("iMax_neg", gains.i_max_neg),
    ];
    for (name, value) in entries {
        store.set(&format!("{joint}.gains.{name}"), value.into())?;
    }
    Ok(())
}

/// Cycle the motor until the console drops its sender. Returns the motor and the number
/// of completed cycles.
pub async fn run_cycle_task<J>(
    mut joint: J,
    mut snapshots: watch::Receiver<TuningSnapshot>,
) -> Result<(J, u64), JointError>
where
    J: TunableMotor,
{
    let mut cycles: u64 = 0;
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        joint.apply_gains(&snapshot.gains, &snapshot.limits).await?;
        let target = snapshot.targets[(cycles % 2) as usize];
        joint.move_to(target).await?;
        tracing::debug!(cycle = cycles, target, "Cycle started");

        let tick = snapshot.cycle_period() / TICKS_PER_CYCLE;
        for _ in 0..TICKS_PER_CYCLE {
            tokio::time::sleep(tick).await;
            let sample = joint.sample().await?;
            tracing::trace!(position = sample.position, effort = sample.dominant_effort());
            if snapshots.has_changed().is_err() {
                tracing::info!(cycles, "Tuning console closed, stopping cycle task");
                return Ok((joint, cycles));
            }
        }
        cycles += 1;
    }
}

/// Read commands from `input` until `q` or end of input. Returns the last snapshot.
pub async fn run_console<R, S>(
    input: &mut R,
    snapshots: watch::Sender<TuningSnapshot>,
    store: &mut S,
    joint: &str,
) -> Result<TuningSnapshot, TuningError>
where
    R: AsyncBufRead + Unpin,
    S: ParamStore + ?Sized,
{
    println!("{}", menu(&snapshots.borrow()));
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line).await? == 0 {
            break;
        }
        let current = snapshots.borrow().clone();
        match parse_command(&current, &line) {
            Ok(ConsoleCommand::Update(next)) => {
                tracing::info!("Applying {}", line.trim());
                snapshots.send_replace(next);
            }
            Ok(ConsoleCommand::ShowMenu) => println!("{}", menu(&current)),
            Ok(ConsoleCommand::WriteGains) => {
                write_gains(joint, &current.gains, store)?;
                store.save()?;
                tracing::info!(joint, "Gains written");
            }
            Ok(ConsoleCommand::Quit) => break,
            Ok(ConsoleCommand::Ignored) => {}
            Err(e) => tracing::warn!("{e}"),
        }
    }
    let last = snapshots.borrow().clone();
    Ok(last)
}
