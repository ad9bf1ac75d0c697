//! Approval and processing queues.
//!
//! A call needing approval waits in the pending list until it is approved or denied, then moves
//! to the process queue. Calls that need no approval go to the process queue directly. An id is
//! in at most one of the two at any time and leaves the process queue when it is popped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use warden_core::{PermissionPolicy, Result, WalletError};
use warden_rpc::{RemoteCall, RequestId};

/// A call waiting for the user's decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    pub request: RemoteCall,
    pub permission_granted: bool,
    pub inserted_at: DateTime<Utc>,
    /// Network generation at arrival.
    pub generation: u64,
}

impl PendingRequest {
    pub fn id(&self) -> RequestId {
        self.request.id_or_default()
    }
}

/// A decided call waiting to be processed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessQueueEntry {
    pub request: RemoteCall,
    pub permission_granted: bool,
    pub generation: u64,
}

impl ProcessQueueEntry {
    pub fn id(&self) -> RequestId {
        self.request.id_or_default()
    }
}

impl From<PendingRequest> for ProcessQueueEntry {
    fn from(pending: PendingRequest) -> Self {
        Self {
            request: pending.request,
            permission_granted: pending.permission_granted,
            generation: pending.generation,
        }
    }
}

/// Where [`RequestQueue::enqueue`] put a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Waiting for approval.
    Pending,
    /// Ready to be processed.
    Queued,
}

/// What the approval UI shows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// Undecided calls, oldest first.
    pub pending: Vec<PendingRequest>,
    /// Number of calls waiting to be processed.
    pub queued: usize,
}

#[derive(Debug, Default)]
pub struct RequestQueue {
    policy: PermissionPolicy,
    pending: VecDeque<PendingRequest>,
    process: VecDeque<ProcessQueueEntry>,
}

impl RequestQueue {
    pub fn new(policy: PermissionPolicy) -> Self {
        Self { policy, pending: VecDeque::new(), process: VecDeque::new() }
    }

    pub fn policy(&self) -> PermissionPolicy {
        self.policy
    }

    /// Accepts a call, assigning the default id if it has none.
    ///
    /// Fails if a call with the same id is still pending or queued.
    pub fn enqueue(&mut self, call: RemoteCall, generation: u64) -> Result<Placement> {
        let call = call.with_default_id();
        let id = call.id_or_default();
        if self.contains(id) {
            return Err(WalletError::validation("id", format!("request {id} is already in flight")));
        }

        if self.policy.requires_approval(&call.method) {
            trace!(target: "wallet::queue", id, method = %call.method, "awaiting approval");
            self.pending.push_back(PendingRequest {
                request: call,
                permission_granted: false,
                inserted_at: Utc::now(),
                generation,
            });
            Ok(Placement::Pending)
        } else {
            trace!(target: "wallet::queue", id, method = %call.method, "queued");
            self.process.push_back(ProcessQueueEntry {
                request: call,
                permission_granted: true,
                generation,
            });
            Ok(Placement::Queued)
        }
    }

    /// Grants the pending call and moves it to the process queue.
    pub fn approve(&mut self, id: RequestId) -> Result<()> {
        self.decide(id, true)
    }

    /// Denies the pending call, it will be answered with a user denied error.
    pub fn deny(&mut self, id: RequestId) -> Result<()> {
        self.decide(id, false)
    }

    fn decide(&mut self, id: RequestId, granted: bool) -> Result<()> {
        let index = self
            .pending
            .iter()
            .position(|pending| pending.id() == id)
            .ok_or(WalletError::UnknownRequest(id))?;
        if let Some(mut pending) = self.pending.remove(index) {
            pending.permission_granted = granted;
            trace!(target: "wallet::queue", id, granted, "decided");
            self.process.push_back(pending.into());
        }
        Ok(())
    }

    /// Takes the next decided call.
    pub fn pop(&mut self) -> Option<ProcessQueueEntry> {
        self.process.pop_front()
    }

    /// Whether a call with this id is pending or queued.
    pub fn contains(&self, id: RequestId) -> bool {
        self.is_pending(id) || self.process.iter().any(|entry| entry.id() == id)
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.pending.iter().any(|pending| pending.id() == id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingRequest> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn queued_len(&self) -> usize {
        self.process.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.process.is_empty()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.pending.iter().cloned().collect(),
            queued: self.process.len(),
        }
    }
}
