//! Capture and recognition collaborator.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::types::Snapshot;
use crate::io::movement::ControlError;

/// Pixel rectangle on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Handle to a captured (or cropped) image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u64,
    pub region: Region,
    /// Where the backend persisted the image, if it did.
    pub path: Option<PathBuf>,
}

impl Frame {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            frame_id: self.id,
            path: self.path.as_ref().map(|path| path.display().to_string()),
        }
    }
}

/// Screen capture, template matching and text recognition.
pub trait Vision {
    fn capture(&mut self, region: Region) -> Result<Frame, ControlError>;

    /// Find `template` inside `frame`; `None` when it is not visible.
    fn locate(&mut self, template: &str, frame: &Frame) -> Result<Option<Region>, ControlError>;

    fn crop(&mut self, frame: &Frame, region: Region) -> Result<Frame, ControlError>;

    /// Recognize text restricted to `charset`.
    fn recognize_text(&mut self, frame: &Frame, charset: &str) -> Result<String, ControlError>;

    /// Most recent full capture, attached to failure reports.
    fn last_capture(&self) -> Option<Frame>;
}
