use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use std::{fs, io};

use anyhow::Result;
use futures::{future, prelude::*};
use log::{info, trace};
use tarpc::{
    context,
    server::{self, Channel},
    serde_transport,
    tokio_serde::formats::Json,
};
use tokio::task::JoinHandle;

use crate::registry::Registry;
use crate::{Outcome, Phase, Scheduler, TaskAssignment};

/// Default endpoint, unique per user on this host.
pub fn coordinator_sock() -> PathBuf {
    // getuid cannot fail.
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/var/tmp/map-reduce-{}.sock", uid))
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

// Implements the generated Scheduler trait; one clone serves every request.
#[derive(Debug, Clone)]
struct SchedulerServer {
    registry: Arc<Mutex<Registry>>,
}

impl Scheduler for SchedulerServer {
    async fn request_task(self, _: context::Context) -> TaskAssignment {
        let task = lock(&self.registry).request_task(Instant::now());
        trace!("request_task -> {:?}", task);
        task
    }

    async fn report_task(self, _: context::Context, id: usize, phase: Phase, outcome: Outcome) {
        trace!("report_task({}, {:?}, {:?})", id, phase, outcome);
        lock(&self.registry).report_task(id, phase, outcome);
    }
}

async fn spawn(fut: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(fut);
}

/// Owns the task registry of one job and answers workers over a Unix socket.
pub struct Coordinator {
    registry: Arc<Mutex<Registry>>,
}

impl Coordinator {
    pub fn new(files: Vec<PathBuf>, nreduce: usize, timeout: Duration) -> Result<Self> {
        let registry = Registry::new(files, nreduce, timeout)?;
        info!(
            "job with {} map tasks and {} reduce tasks",
            registry.nmap(),
            registry.nreduce()
        );
        Ok(Self {
            registry: Arc::new(Mutex::new(registry)),
        })
    }

    /// Whether every map and reduce task has completed.
    pub fn done(&self) -> bool {
        lock(&self.registry).done()
    }

    /// Replace any stale endpoint at `socket`, bind it and serve workers in
    /// the background until the returned handle is aborted.
    pub async fn serve(&self, socket: &Path) -> io::Result<JoinHandle<()>> {
        match fs::remove_file(socket) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        let listener = serde_transport::unix::listen(socket, Json::default).await?;
        info!("listening on {:?}", socket);

        let server = SchedulerServer {
            registry: self.registry.clone(),
        };
        Ok(tokio::spawn(
            listener
                // Ignore accept errors.
                .filter_map(|r| future::ready(r.ok()))
                .map(server::BaseChannel::with_defaults)
                .for_each(move |channel| {
                    // Workers keep their connection for the whole job, so every
                    // channel runs on its own task.
                    tokio::spawn(channel.execute(server.clone().serve()).for_each(spawn));
                    future::ready(())
                }),
        ))
    }
}
