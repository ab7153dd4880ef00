use crate::shared::frame::Frame;

/// Supplies the most recently captured frame.
///
/// Sources may run their own capture thread; callers only ever see the
/// newest frame, which can be stale by up to one frame interval.
pub trait FrameSource: Send {
    /// Returns the newest frame, or `None` if nothing has arrived yet.
    fn latest_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;
}
