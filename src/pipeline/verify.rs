use std::path::PathBuf;

use crate::media::{AudioEngine, MediaError};
use crate::ui::prelude::{Level, emit};

use super::workspace::JobWorkspace;

/// A finished track may drift from the video duration by at most this much.
pub const FINAL_TOLERANCE_MS: f64 = 100.0;

const MAX_CORRECTION_ATTEMPTS: usize = 3;

/// Bounded correction loop: measure, then trim or pad until the track is
/// within tolerance or attempts run out. An already-correct track performs
/// no corrective work at all. Exhaustion logs a warning and keeps the
/// best-effort track; a slightly desynced result beats no result.
pub fn verify_duration(
    engine: &dyn AudioEngine,
    workspace: &JobWorkspace,
    track: PathBuf,
    target_duration: f64,
    label: &str,
) -> Result<(PathBuf, f64), MediaError> {
    let mut current = track;

    for attempt in 0..MAX_CORRECTION_ATTEMPTS {
        let measured = engine.duration_seconds(&current)?;
        let drift_ms = (measured - target_duration) * 1000.0;
        if drift_ms.abs() <= FINAL_TOLERANCE_MS {
            return Ok((current, drift_ms));
        }

        if drift_ms > 0.0 {
            let trimmed = workspace.path(&format!("{label}-correct{attempt}-trim.wav"));
            engine.hard_trim(&current, &trimmed, target_duration)?;
            current = trimmed;
        } else {
            let silence = workspace.path(&format!("{label}-correct{attempt}-silence.wav"));
            engine.generate_silence(&silence, target_duration - measured)?;
            let padded = workspace.path(&format!("{label}-correct{attempt}-pad.wav"));
            engine.concatenate(&[current.clone(), silence], &padded)?;
            current = padded;
        }
    }

    let measured = engine.duration_seconds(&current)?;
    let drift_ms = (measured - target_duration) * 1000.0;
    if drift_ms.abs() > FINAL_TOLERANCE_MS {
        emit(
            Level::Warn,
            "pipeline.verify.tolerance_exceeded",
            &format!(
                "Track still {drift_ms:.0}ms off target after {MAX_CORRECTION_ATTEMPTS} corrections; continuing with best effort"
            ),
            None,
        );
    }
    Ok((current, drift_ms))
}
