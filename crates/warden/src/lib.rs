//! A custodial signing agent.
//!
//! A [`Session`] brokers [`RemoteCall`](warden_rpc::RemoteCall)s from an untrusted embedding page
//! to one [`SigningBackend`]. Calls that touch key material wait in the [`RequestQueue`] until the
//! user approves or denies them, the [`RequestProcessor`] then drains the queue through the
//! [`RemoteCallRouter`] and replies over the [`HostChannel`].

#[macro_use]
extern crate tracing;

pub mod channel;
pub mod config;
pub mod processor;
pub mod queue;
pub mod router;
pub mod session;
pub mod signer;
pub mod store;
pub mod transport;

pub use channel::{HostChannel, LocalChannel};
pub use config::WardenConfig;
pub use processor::RequestProcessor;
pub use queue::{PendingRequest, Placement, ProcessQueueEntry, QueueSnapshot, RequestQueue};
pub use router::RemoteCallRouter;
pub use session::{AccountType, Session};
pub use signer::SigningBackend;
pub use store::{AssetStore, KeyValueStore, MemoryStore};
pub use transport::{HttpTransport, Transport, TransportError};

pub use warden_core as core;
pub use warden_rpc as rpc;
