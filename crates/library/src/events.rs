use serde::{Deserialize, Serialize};

use crate::scanner::ScanReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanPhase {
    Idle,
    Discovering,
    Diffing,
    Filling,
    Committing,
    Failed,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Idle => "idle",
            ScanPhase::Discovering => "discovering",
            ScanPhase::Diffing => "diffing",
            ScanPhase::Filling => "filling",
            ScanPhase::Committing => "committing",
            ScanPhase::Failed => "failed",
        }
    }
}

/// Progress and completion signals emitted while indexing.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Phase {
        library_id: String,
        phase: ScanPhase,
    },
    Progress {
        library_id: String,
        processed: usize,
        total: usize,
        failed: usize,
    },
    Finished(ScanReport),
    Failed {
        library_id: String,
        reason: String,
    },
    ArtworkReady {
        album_key: String,
        artwork_path: Option<String>,
    },
}

pub trait ScanListener: Send + Sync {
    fn on_event(&self, event: &ScanEvent);
}

impl<F> ScanListener for F
where
    F: Fn(&ScanEvent) + Send + Sync,
{
    fn on_event(&self, event: &ScanEvent) {
        self(event)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl ScanListener for NullListener {
    fn on_event(&self, _event: &ScanEvent) {}
}
