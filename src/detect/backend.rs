use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Object detector backend.
///
/// The model itself lives outside this crate; implementations adapt it to
/// per-frame `Detection` lists and expose the model's class names.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// An error degrades only the current frame; the pipeline keeps running.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Human-readable label for a class id.
    fn class_name(&self, class_id: u32) -> String;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
