//! FlowBus pub/sub for file system events.
//!
//! Every completed mutation and every workspace state change is published
//! here. Consumers (tree renderer, editor tabs, shell prompt) subscribe with
//! NATS-style subject patterns instead of threading callbacks through the
//! orchestrator.
//!
//! # Pattern Matching
//!
//! Patterns use dot-separated tokens with wildcards:
//! - `*` matches exactly one token: `fs.*` matches `fs.created` but not `fs.upload.done`
//! - `>` matches one or more tokens (only at end): `workspace.>` matches everything under `workspace`
//! - Exact match: `fs.renamed` only matches `fs.renamed`
//!
//! # Example
//!
//! ```ignore
//! let bus = FlowBus::<FsFlow>::new(256);
//! let mut sub = bus.subscribe("workspace.*");
//!
//! bus.publish(FsFlow::WorkspaceDisconnected { mount_path: "/proj".into(), operation: None });
//!
//! while let Some(msg) = sub.recv().await {
//!     println!("{}", msg.subject);
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use canopy_types::NodeKind;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

// ============================================================================
// Pattern Matching
// ============================================================================

/// Check if a subject matches a pattern.
///
/// `*` stands for exactly one token; a trailing `>` for one or more.
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let mut subject = subject.split('.');
    let mut pattern = pattern.split('.').peekable();
    while let Some(token) = pattern.next() {
        if token == ">" {
            return pattern.peek().is_none() && subject.next().is_some();
        }
        match subject.next() {
            Some(s) if token == "*" || token == s => {}
            _ => return false,
        }
    }
    subject.next().is_none()
}

// ============================================================================
// Flow Message Types
// ============================================================================

/// Payloads that know their own subject.
pub trait HasSubject {
    fn subject(&self) -> &str;
}

/// One published event, stamped on the way in.
#[derive(Clone, Debug)]
pub struct FlowMessage<T> {
    pub subject: String,
    pub payload: T,
    pub timestamp: Instant,
}

impl<T: HasSubject> FlowMessage<T> {
    pub fn new(payload: T) -> Self {
        Self {
            subject: payload.subject().to_string(),
            payload,
            timestamp: Instant::now(),
        }
    }
}

// ============================================================================
// File System Flow Events
// ============================================================================

/// File system and workspace events.
///
/// Paths are absolute tree paths (`/scratch/main.lua`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsFlow {
    /// A file or folder was created (including creation placeholders).
    Created { path: String, kind: NodeKind },

    /// File content was written.
    Written { path: String, bytes: usize },

    /// A node was renamed in place.
    Renamed { from: String, to: String },

    /// A node and its subtree were deleted.
    Deleted { path: String },

    /// A node moved within one workspace.
    Moved { from: String, to: String },

    /// A node was copied (possibly across workspaces).
    Copied { from: String, to: String },

    /// An upload batch finished.
    Uploaded {
        target: String,
        success: usize,
        failed: usize,
        cancelled: bool,
    },

    WorkspaceAdded { mount_path: String, name: String },

    WorkspaceRemoved { mount_path: String },

    /// Display name changed; the mount path is stable.
    WorkspaceRenamed { mount_path: String, name: String },

    WorkspaceConnected { mount_path: String },

    /// Access was lost or withdrawn. `operation` names the call that hit
    /// `PermissionDenied`, if the disconnect was automatic.
    WorkspaceDisconnected {
        mount_path: String,
        operation: Option<String>,
    },
}

impl FsFlow {
    /// Get the subject string for this event.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Created { .. } => "fs.created",
            Self::Written { .. } => "fs.written",
            Self::Renamed { .. } => "fs.renamed",
            Self::Deleted { .. } => "fs.deleted",
            Self::Moved { .. } => "fs.moved",
            Self::Copied { .. } => "fs.copied",
            Self::Uploaded { .. } => "fs.uploaded",
            Self::WorkspaceAdded { .. } => "workspace.added",
            Self::WorkspaceRemoved { .. } => "workspace.removed",
            Self::WorkspaceRenamed { .. } => "workspace.renamed",
            Self::WorkspaceConnected { .. } => "workspace.connected",
            Self::WorkspaceDisconnected { .. } => "workspace.disconnected",
        }
    }

    /// The mount path for workspace events.
    pub fn mount_path(&self) -> Option<&str> {
        match self {
            Self::WorkspaceAdded { mount_path, .. }
            | Self::WorkspaceRemoved { mount_path }
            | Self::WorkspaceRenamed { mount_path, .. }
            | Self::WorkspaceConnected { mount_path }
            | Self::WorkspaceDisconnected { mount_path, .. } => Some(mount_path),
            _ => None,
        }
    }
}

impl HasSubject for FsFlow {
    fn subject(&self) -> &str {
        FsFlow::subject(self)
    }
}

// ============================================================================
// FlowBus
// ============================================================================

/// Broadcast bus; each subscriber filters by its own pattern.
///
/// Slow subscribers lose the oldest messages once `capacity` is exceeded
/// and are told how many they missed.
#[derive(Debug)]
pub struct FlowBus<T: Clone + Send + 'static> {
    tx: broadcast::Sender<FlowMessage<T>>,
}

impl<T: Clone + Send + HasSubject + 'static> FlowBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish to every current subscriber. Returns how many there were.
    pub fn publish(&self, payload: T) -> usize {
        // `send` only fails when nobody is listening.
        self.tx.send(FlowMessage::new(payload)).unwrap_or(0)
    }

    pub fn subscribe(&self, pattern: &str) -> Subscription<T> {
        Subscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

/// The file system event bus, shared between the orchestrator and its
/// consumers.
pub type SharedFlowBus = Arc<FlowBus<FsFlow>>;

pub fn shared_flow_bus(capacity: usize) -> SharedFlowBus {
    Arc::new(FlowBus::new(capacity))
}

// ============================================================================
// Subscription
// ============================================================================

/// Pattern-filtered view of a [`FlowBus`].
pub struct Subscription<T: Clone> {
    pattern: String,
    rx: broadcast::Receiver<FlowMessage<T>>,
}

impl<T: Clone> Subscription<T> {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn wants(&self, msg: &FlowMessage<T>) -> bool {
        matches_pattern(&self.pattern, &msg.subject)
    }

    fn report_lag(&self, missed: u64) {
        tracing::warn!(pattern = %self.pattern, missed, "flow subscriber fell behind");
    }

    /// Wait for the next matching message. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if self.wants(&msg) => return Some(msg),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => self.report_lag(missed),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching message already queued, if any.
    pub fn try_recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) if self.wants(&msg) => return Some(msg),
                Ok(_) => {}
                Err(TryRecvError::Lagged(missed)) => self.report_lag(missed),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Every matching message currently queued.
    pub fn drain(&mut self) -> Vec<FlowMessage<T>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl<T: Clone> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("fs.created", "fs.created"));
        assert!(!matches_pattern("fs.created", "fs.deleted"));

        assert!(matches_pattern("fs.*", "fs.created"));
        assert!(matches_pattern("*.renamed", "fs.renamed"));
        assert!(!matches_pattern("fs.*", "fs.upload.done"));
        assert!(!matches_pattern("fs.*", "fs"));

        assert!(matches_pattern("workspace.>", "workspace.disconnected"));
        assert!(matches_pattern(">", "fs.created"));
        assert!(!matches_pattern("workspace.>", "workspace"));
        assert!(!matches_pattern("workspace.>", "fs.created"));
    }

    #[test]
    fn test_subjects() {
        let flow = FsFlow::WorkspaceDisconnected {
            mount_path: "/proj".into(),
            operation: Some("create_file".into()),
        };
        assert_eq!(flow.subject(), "workspace.disconnected");
        assert_eq!(flow.mount_path(), Some("/proj"));
        assert_eq!(FsFlow::Deleted { path: "/a/b".into() }.mount_path(), None);
    }

    #[tokio::test]
    async fn test_subscription_filters_by_pattern() {
        let bus = FlowBus::<FsFlow>::new(16);
        let mut fs_sub = bus.subscribe("fs.*");
        let mut ws_sub = bus.subscribe("workspace.>");

        bus.publish(FsFlow::Created {
            path: "/scratch/untitled.lua".into(),
            kind: NodeKind::File,
        });
        bus.publish(FsFlow::WorkspaceConnected {
            mount_path: "/proj".into(),
        });

        let msg = fs_sub.recv().await.unwrap();
        assert_eq!(msg.subject, "fs.created");
        assert!(fs_sub.try_recv().is_none());

        let msg = ws_sub.try_recv().unwrap();
        assert_eq!(msg.payload.mount_path(), Some("/proj"));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = FlowBus::<FsFlow>::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(FsFlow::Deleted { path: "/a".into() }), 0);
    }

    #[test]
    fn test_drain() {
        let bus = shared_flow_bus(8);
        let mut sub = bus.subscribe("fs.deleted");
        bus.publish(FsFlow::Deleted { path: "/a".into() });
        bus.publish(FsFlow::Written { path: "/b".into(), bytes: 1 });
        bus.publish(FsFlow::Deleted { path: "/c".into() });
        assert_eq!(sub.drain().len(), 2);
    }
}
