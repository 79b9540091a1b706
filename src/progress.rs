// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Progress reporting for long-running operations
//!
//! The lister and the node inspector report what they are doing through a
//! broadcast channel, which the CLI turns into a spinner message.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

/// Create a spinner with consistent styling
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg} {elapsed:.dim}")
    {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Progress update message
#[derive(Clone, Debug)]
pub enum ProgressUpdate {
    // === Enumeration ===
    /// Starting to enumerate (namespace, kind) targets
    EnumerationStarted { targets: usize },
    /// One target finished
    TargetComplete {
        namespace: String,
        resource: String,
        items: usize,
        elapsed_ms: u64,
    },
    /// One target failed (non-fatal)
    TargetFailed { namespace: String, resource: String },

    // === Node inspection ===
    /// Scanning workload submitted
    WorkloadCreated { workload: String },
    /// Readiness poll result
    NodesReady {
        workload: String,
        ready: usize,
        desired: usize,
    },
    /// Scanning workload deleted
    TeardownComplete { workload: String },
}

/// Progress reporter shared by all operations of one engine
pub struct ProgressReporter {
    sender: broadcast::Sender<ProgressUpdate>,
    /// Count of finished targets for current enumeration
    targets_done: AtomicUsize,
    /// Total targets for current enumeration
    targets_total: AtomicUsize,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self {
            sender,
            targets_done: AtomicUsize::new(0),
            targets_total: AtomicUsize::new(0),
        }
    }

    /// Subscribe to progress updates
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }

    pub fn enumeration_started(&self, targets: usize) {
        self.targets_done.store(0, Ordering::SeqCst);
        self.targets_total.store(targets, Ordering::SeqCst);
        let _ = self
            .sender
            .send(ProgressUpdate::EnumerationStarted { targets });
    }

    pub fn target_complete(&self, namespace: &str, resource: &str, items: usize, elapsed_ms: u64) {
        self.targets_done.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(ProgressUpdate::TargetComplete {
            namespace: namespace.to_string(),
            resource: resource.to_string(),
            items,
            elapsed_ms,
        });
    }

    pub fn target_failed(&self, namespace: &str, resource: &str) {
        self.targets_done.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(ProgressUpdate::TargetFailed {
            namespace: namespace.to_string(),
            resource: resource.to_string(),
        });
    }

    pub fn workload_created(&self, workload: &str) {
        let _ = self.sender.send(ProgressUpdate::WorkloadCreated {
            workload: workload.to_string(),
        });
    }

    pub fn nodes_ready(&self, workload: &str, ready: usize, desired: usize) {
        let _ = self.sender.send(ProgressUpdate::NodesReady {
            workload: workload.to_string(),
            ready,
            desired,
        });
    }

    pub fn teardown_complete(&self, workload: &str) {
        let _ = self.sender.send(ProgressUpdate::TeardownComplete {
            workload: workload.to_string(),
        });
    }

    /// Get current progress (done/total)
    pub fn progress(&self) -> (usize, usize) {
        (
            self.targets_done.load(Ordering::SeqCst),
            self.targets_total.load(Ordering::SeqCst),
        )
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle to progress reporter
pub type ProgressHandle = Arc<ProgressReporter>;

/// Create a new progress reporter handle
pub fn create_progress_handle() -> ProgressHandle {
    Arc::new(ProgressReporter::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_reporter_new() {
        let reporter = ProgressReporter::new();
        assert_eq!(reporter.progress(), (0, 0));
    }

    #[test]
    fn test_target_complete_increments() {
        let reporter = ProgressReporter::new();
        reporter.enumeration_started(3);

        reporter.target_complete("default", "pods", 10, 100);
        assert_eq!(reporter.progress(), (1, 3));

        reporter.target_failed("default", "roles");
        assert_eq!(reporter.progress(), (2, 3));
    }

    #[test]
    fn test_enumeration_started_resets_counters() {
        let reporter = ProgressReporter::new();
        reporter.enumeration_started(2);
        reporter.target_complete("a", "pods", 1, 1);
        reporter.enumeration_started(5);
        assert_eq!(reporter.progress(), (0, 5));
    }

    #[test]
    fn test_subscribe_receives_updates() {
        let reporter = ProgressReporter::new();
        let mut receiver = reporter.subscribe();

        reporter.enumeration_started(2);
        reporter.workload_created("scan-1");
        reporter.nodes_ready("scan-1", 1, 2);
        reporter.teardown_complete("scan-1");

        let updates: Vec<_> = std::iter::from_fn(|| receiver.try_recv().ok()).collect();
        assert_eq!(updates.len(), 4);
        assert!(matches!(
            updates[0],
            ProgressUpdate::EnumerationStarted { targets: 2 }
        ));
        assert!(matches!(updates[1], ProgressUpdate::WorkloadCreated { .. }));
        assert!(matches!(
            updates[2],
            ProgressUpdate::NodesReady {
                ready: 1,
                desired: 2,
                ..
            }
        ));
        assert!(matches!(updates[3], ProgressUpdate::TeardownComplete { .. }));
    }

    #[test]
    fn test_send_without_subscribers_is_ignored() {
        let reporter = create_progress_handle();
        reporter.target_complete("ns", "pods", 0, 0);
        assert_eq!(reporter.progress(), (1, 0));
    }
}
