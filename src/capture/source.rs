use crate::error::Result;

use super::frame::Frame;
use super::pool::FramePool;

/// Anything that can hand out camera frames.
///
/// `acquire` may block briefly while the device readies a buffer. It must not
/// spin: when the device is unavailable it returns `CaptureFailed` and the
/// caller decides how long to back off.
pub trait FrameSource: Send + Sync {
    fn acquire(&self) -> Result<Frame>;

    /// Give a frame's buffer back to the device pool.
    fn release(&self, frame: Frame) {
        frame.release();
    }

    /// The pool every frame of this source is checked out from.
    fn pool(&self) -> &FramePool;
}
