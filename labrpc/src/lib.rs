//! In-process RPC: typed services generated by [`service!`] exchange JSON
//! packages through a [`Network`] router that can be made unreliable.

pub mod client;
mod macros;
pub mod network;
pub mod server;

pub use anyhow;
pub use async_trait::async_trait;
pub use futures;
pub use log;
pub use rand;
pub use serde;
pub use serde_json;
pub use tokio;

pub use network::{Network, Reliability};
