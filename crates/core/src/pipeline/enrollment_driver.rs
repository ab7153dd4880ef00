use std::time::Duration;

use crate::enrollment::capture_session::TickOutcome;
use crate::pipeline::face_id_controller::{CaptureState, FaceIdController};
use crate::pipeline::training_executor::TrainingReport;
use crate::shared::error::FaceIdError;

/// Runs one enrollment to completion on a fixed-interval timer: capture
/// ticks while running, then completion polls while training.
///
/// `on_tick` sees the 1-based tick number and its outcome.
pub fn run_enrollment(
    controller: &mut FaceIdController,
    label: &str,
    interval: Duration,
    mut on_tick: impl FnMut(u32, &TickOutcome),
) -> Result<TrainingReport, FaceIdError> {
    let label = controller.start_capture(label)?;
    let ticker = crossbeam_channel::tick(interval);
    let mut tick = 0u32;

    loop {
        if ticker.recv().is_err() {
            return Err(FaceIdError::Cancelled);
        }
        match controller.state() {
            CaptureState::Running => {
                if let Some(outcome) = controller.tick() {
                    tick += 1;
                    on_tick(tick, &outcome);
                }
            }
            CaptureState::Flushing => {
                if let Some(result) = controller.poll_training() {
                    if result.is_ok() {
                        log::info!("Enrollment for label {label} complete");
                    }
                    return result;
                }
            }
            CaptureState::Idle => return Err(FaceIdError::Cancelled),
        }
    }
}
