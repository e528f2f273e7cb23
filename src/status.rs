use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Pipeline health shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    ModelLoading,
    ModelReady,
    CameraDenied,
    Stopped,
}

impl Status {
    /// Free-text readout for presentation layers.
    pub fn readout(self) -> &'static str {
        match self {
            Status::ModelLoading => "Loading model…",
            Status::ModelReady => "Model ready",
            Status::CameraDenied => "Camera access denied",
            Status::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.readout())
    }
}

/// Single-writer status cell.
///
/// `CameraDenied` is sticky: once the camera is refused nothing else may
/// overwrite it for the rest of the session.
#[derive(Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<Status>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Status::ModelLoading);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> Status {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }

    pub(crate) fn set(&self, status: Status) {
        self.tx.send_if_modified(|current| {
            if *current == status || *current == Status::CameraDenied {
                return false;
            }
            log::info!("status: {} -> {}", current, status);
            *current = status;
            true
        });
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}
