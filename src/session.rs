//! Session capability consumed by the sync layer.
//!
//! The host application owns session provisioning; this layer only observes
//! resolution status and the bearer credential through a `watch` channel.
//! An absent credential is a valid terminal state for ungated resources and
//! a blocking condition for gated ones.

use tokio::sync::watch;

/// Where session resolution currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Resolution still in progress; gated resources must not fetch yet.
    Pending,
    /// A session exists; a credential may or may not be attached.
    Resolved,
    /// Resolution finished with no session.
    Absent,
}

/// Snapshot of the session as published by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub status: SessionStatus,
    pub access_token: Option<String>,
}

impl SessionState {
    pub fn pending() -> Self {
        Self {
            status: SessionStatus::Pending,
            access_token: None,
        }
    }

    pub fn absent() -> Self {
        Self {
            status: SessionStatus::Absent,
            access_token: None,
        }
    }

    pub fn resolved(access_token: Option<String>) -> Self {
        Self {
            status: SessionStatus::Resolved,
            access_token,
        }
    }

    /// The usable bearer credential: resolved and non-empty, else `None`.
    pub fn credential(&self) -> Option<&str> {
        if self.status != SessionStatus::Resolved {
            return None;
        }
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Publisher side of the session channel, held by the host application.
pub struct SessionFeed {
    tx: watch::Sender<SessionState>,
}

impl SessionFeed {
    /// Start a feed in the `Pending` state.
    pub fn new() -> (Self, watch::Receiver<SessionState>) {
        let (tx, rx) = watch::channel(SessionState::pending());
        (Self { tx }, rx)
    }

    /// Publish a new session state to all observers.
    pub fn set(&self, state: SessionState) {
        // send_replace retains the latest state for receivers that attach later.
        self.tx.send_replace(state);
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}
