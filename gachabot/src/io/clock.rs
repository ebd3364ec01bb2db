//! Wall clock and shutdown signalling.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::io::movement::ControlError;

/// Source of the current time and of blocking sleeps.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Shared shutdown flag, optionally also raised by the presence of a stop file.
///
/// Also carries the pause switch: the loop idles while it is on, either
/// because it was set or because the pause file exists.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    stop_file: Option<PathBuf>,
    paused: Arc<AtomicBool>,
    pause_file: Option<PathBuf>,
}

impl Shutdown {
    pub fn new(stop_file: Option<PathBuf>) -> Self {
        Self {
            stop_file,
            ..Self::default()
        }
    }

    pub fn with_pause_file(mut self, pause_file: Option<PathBuf>) -> Self {
        self.pause_file = pause_file;
        self
    }

    /// Flip the pause switch; returns whether the loop is now paused.
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::SeqCst)
    }

    /// Unlike the stop file, removing the pause file resumes the loop.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
            || self.pause_file.as_ref().is_some_and(|path| path.exists())
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        if let Some(path) = &self.stop_file
            && path.exists()
        {
            info!(path = %path.display(), "stop file present, shutting down");
            self.request();
            return true;
        }
        false
    }

    /// `Err(Terminated)` once shutdown was requested.
    pub fn check(&self) -> Result<(), ControlError> {
        if self.is_requested() {
            Err(ControlError::Terminated)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_visible_to_clones() {
        let shutdown = Shutdown::new(None);
        let other = shutdown.clone();
        assert!(shutdown.check().is_ok());
        other.request();
        assert!(matches!(shutdown.check(), Err(ControlError::Terminated)));
    }

    #[test]
    fn pause_toggles_and_follows_pause_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pause = temp.path().join("PAUSE");
        let shutdown = Shutdown::new(None).with_pause_file(Some(pause.clone()));
        assert!(!shutdown.is_paused());

        assert!(shutdown.clone().toggle_pause());
        assert!(shutdown.is_paused());
        assert!(!shutdown.toggle_pause());
        assert!(!shutdown.is_paused());

        std::fs::write(&pause, "").expect("write pause file");
        assert!(shutdown.is_paused());
        std::fs::remove_file(&pause).expect("remove pause file");
        assert!(!shutdown.is_paused());
        assert!(!shutdown.is_requested());
    }

    #[test]
    fn stop_file_raises_the_flag() {
        let temp = tempfile::tempdir().expect("tempdir");
        let stop = temp.path().join("STOP");
        let shutdown = Shutdown::new(Some(stop.clone()));
        assert!(!shutdown.is_requested());
        std::fs::write(&stop, "").expect("write stop file");
        assert!(shutdown.is_requested());
        std::fs::remove_file(&stop).expect("remove stop file");
        assert!(shutdown.is_requested());
    }
}
