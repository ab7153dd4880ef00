use std::sync::{Arc, Mutex, MutexGuard};

use crate::capture::domain::frame_source::FrameSource;
use crate::shared::frame::Frame;

/// Single-frame mailbox shared between a capture thread and its readers.
///
/// Publishing replaces whatever was there; readers get a clone of the newest
/// frame and never block the producer for longer than that copy.
#[derive(Clone, Default)]
pub struct LatestFrameSlot {
    frame: Arc<Mutex<Option<Frame>>>,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Frame) {
        *self.guard() = Some(frame);
    }

    pub fn latest(&self) -> Option<Frame> {
        self.guard().clone()
    }

    fn guard(&self) -> MutexGuard<'_, Option<Frame>> {
        // A panicking producer leaves a complete frame or none; both are usable.
        self.frame.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FrameSource for LatestFrameSlot {
    fn latest_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        Ok(self.latest())
    }
}
