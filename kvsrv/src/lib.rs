#![deny(missing_docs)]
#![deny(clippy::all)]
//! Single-node key-value store whose mutations are applied at most once
//! although clients retry every request until it gets through.
//!
//! Each logical request carries a client-chosen id and is sent twice: first
//! as [`Phase::Pending`], which applies it and caches the reply under the id,
//! then as [`Phase::Committed`], which drops the cached reply.

use serde::{Deserialize, Serialize};

/// Stage of a two-phase request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Apply the request unless its id was already applied; reply with the
    /// result, replaying the cached one on retries.
    Pending,
    /// The caller has the reply; forget the id.
    Committed,
}

labrpc::service! {
    service kv_service {
        fn get(id: u64, phase: Phase, key: String) -> String;
        fn put(id: u64, phase: Phase, key: String, value: String) -> ();
        fn append(id: u64, phase: Phase, key: String, value: String) -> String;
    }
}

pub use kv_service::{Client as KvClient, Server as KvServer, Service as KvService};

/// KV Store Server.
pub mod kv;

/// KV Store Client.
pub mod client;


pub use client::Clerk;
pub use kv::KvStore;
