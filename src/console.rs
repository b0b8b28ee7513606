// src/console.rs - Operator-facing text and prompts
use crate::calibration::controller::{CalibrationState, HistoryEntry, Transition};
use crate::calibration::limits::DynamicLimits;
use std::fmt::Write as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt};

/// Multi-line summary of a trial, printed after every trial and for each optimum.
pub fn motion_overview(joint: &str, state: &CalibrationState, entry: &HistoryEntry) -> String {
    let eval = entry.trial.evaluation();
    let targets = state.targets();
    let mut out = String::new();
    let _ = writeln!(out, "---------- {} {} ----------", joint.to_uppercase(), state.label());
    let _ = writeln!(out, "Result: {} ({})", eval.verdict, entry.outcome.label());
    let _ = writeln!(
        out,
        "Travel: {} cm in {} s ({} cm/s)",
        eval.travel_range_cm, eval.travel_duration_seconds, eval.linear_speed_cm_per_second
    );
    let _ = writeln!(
        out,
        "Goal: {} cm  Actual: {} cm  Error: {} cm (target < {} cm)",
        eval.goal_position_cm,
        eval.actual_position_cm,
        eval.error_absolute_cm,
        targets.goal_error_absolute_target_cm
    );
    match eval.error_percent {
        Some(pct) => {
            let _ = writeln!(
                out,
                "Error: {pct} % (target < {} %)",
                targets.goal_error_percentage_target
            );
        }
        None => {
            let _ = writeln!(out, "Error: n/a (goal at zero)");
        }
    }
    let _ = writeln!(
        out,
        "Effort: max {} %  min {} %  avg {} %  peak |{}| % (target < {} %)",
        eval.max_effort_percent,
        eval.min_effort_percent,
        eval.average_effort_percent,
        eval.max_abs_effort_percent,
        targets.effort_percent_target
    );
    if let Some(stop) = eval.safety_stop {
        let _ = writeln!(out, "Motion stopped for safety: {stop:?}");
    }
    out
}

pub fn transition_message(state: &CalibrationState, transition: Transition) -> String {
    match transition {
        Transition::Next(duration) => format!(
            "{}: next travel duration {:.3} s",
            state.label(),
            duration
        ),
        Transition::Converged => match state.optimal() {
            Some(optimal) => format!(
                "{}: converged, optimal travel duration {} s",
                state.label(),
                optimal.duration()
            ),
            None => format!("{}: converged", state.label()),
        },
    }
}

pub fn limits_overview(joint: &str, limits: &[DynamicLimits]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Dynamic limits for {joint}:");
    for limit in limits {
        let accel = limit
            .accel_m
            .map(|a| format!("{a} m/s^2"))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  {:<8} {:<8} T={} s  vel={} m/s  accel={}  effort={} %",
            limit.profile.name(),
            limit.direction.name(),
            limit.travel_duration_seconds,
            limit.vel_m,
            accel,
            limit.effort_pct
        );
    }
    out
}

/// Ask a yes/no question on `input`. Anything but `y`/`yes` is a no; `assume_yes`
/// answers without reading.
pub async fn confirm<R>(input: &mut R, prompt: &str, assume_yes: bool) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    if assume_yes {
        tracing::info!("{prompt} (assumed yes)");
        return Ok(true);
    }
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{prompt} [y/N]: ").as_bytes()).await?;
    stdout.flush().await?;
    let mut line = String::new();
    input.read_line(&mut line).await?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
