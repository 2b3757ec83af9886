use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use futures::Future;
use log::{debug, info, trace, warn};
use rand::Rng;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::{client::Client, server::Server};

#[derive(Debug, Clone)]
pub struct NetworkPackage {
    pub to: String,
    pub reply: Sender<String>,
    pub data: String,
}

/// Delivery guarantees of a [`Network`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reliability {
    /// Every request and every reply is delivered.
    Reliable,
    /// Each request, and independently each reply, is lost with probability
    /// `loss`. A lost reply is only lost after the server handled the request.
    Unreliable { loss: f64 },
}

impl Reliability {
    fn lose(&self) -> bool {
        match *self {
            Reliability::Reliable => false,
            Reliability::Unreliable { loss } => rand::thread_rng().gen_bool(loss.clamp(0.0, 1.0)),
        }
    }
}

pub struct Network {
    pub tx: Sender<NetworkPackage>,
    rx: Receiver<NetworkPackage>,
    pub nodes: Arc<Mutex<HashMap<String, Sender<NetworkPackage>>>>,
    reliability: Reliability,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self::with_reliability(Reliability::Reliable)
    }

    pub fn with_reliability(reliability: Reliability) -> Self {
        let (tx, rx) = mpsc::channel(100);
        Self {
            tx,
            rx,
            nodes: Arc::new(Mutex::new(HashMap::default())),
            reliability,
        }
    }

    /// Register a server under `id`. Returns a client addressing it and the
    /// server routine, which must be spawned. The routine rebuilds the service
    /// with `f` whenever the server fails.
    pub fn register_service<S, C, F, V>(&self, id: String, f: F) -> (C, impl Future<Output = ()>)
    where
        F: Fn() -> V,
        S: Server<Service = V> + Send + 'static,
        C: Client,
    {
        let client = C::from_server(id.clone(), self.tx.clone());
        debug!("registering {}", client.server_id());
        let nodes = self.nodes.clone();
        (client, async move {
            loop {
                let mut server = S::from_service(f());
                nodes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(id.clone(), server.client_chan());
                if server.run().await.is_ok() {
                    break;
                } else {
                    info!("server {} restart", id);
                }
            }
        })
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub async fn run(&mut self) {
        while let Some(NetworkPackage { to, reply, data }) = self.rx.recv().await {
            if self.reliability.lose() {
                // Dropping `reply` wakes the caller with a transport failure.
                warn!("request to {} lost", to);
                continue;
            }
            let reply = if self.reliability.lose() {
                lossy_reply(to.clone(), reply)
            } else {
                reply
            };

            let node = {
                let nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
                nodes.get(&to).cloned()
            };

            if let Some(x) = node {
                if x.send(NetworkPackage { to, reply, data }).await.is_err() {
                    warn!("send to node failed, dropped");
                }
            } else {
                warn!("node {} not found", to);
            }
        }
    }
}

/// Swallow whatever the server answers, keeping the caller waiting until the
/// server has actually replied.
fn lossy_reply(to: String, reply: Sender<String>) -> Sender<String> {
    let (tx, mut rx) = mpsc::channel::<String>(1);
    tokio::spawn(async move {
        if let Some(resp) = rx.recv().await {
            warn!("reply from {} lost: {}", to, resp);
        }
        trace!("closing reply channel of {}", to);
        drop(reply);
    });
    tx
}
