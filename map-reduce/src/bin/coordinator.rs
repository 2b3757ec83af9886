use std::path::PathBuf;
use std::time::Duration;

use log::info;
use structopt::StructOpt;

use map_reduce::{coordinator_sock, Coordinator, DEFAULT_TIMEOUT};

#[derive(StructOpt, Debug)]
#[structopt(name = "coordinator", version = env!("CARGO_PKG_VERSION"), author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    /// Unix socket to listen on [default: /var/tmp/map-reduce-<uid>.sock]
    #[structopt(short, long, parse(from_os_str))]
    socket: Option<PathBuf>,

    /// Seconds after which an unreported task is handed out again [default: 10]
    #[structopt(short, long)]
    timeout: Option<u64>,

    /// Number of reduce tasks
    #[structopt(long, default_value = "10")]
    nreduce: usize,

    /// Input files, one map task each
    #[structopt(name = "FILE", parse(from_os_str))]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    let socket = opt.socket.unwrap_or_else(coordinator_sock);
    let timeout = opt.timeout.map_or(DEFAULT_TIMEOUT, Duration::from_secs);
    let c = Coordinator::new(opt.files, opt.nreduce, timeout)?;
    let server = c.serve(&socket).await?;

    while !c.done() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    info!("job done");
    // Give polling workers the chance to see Exit.
    tokio::time::sleep(Duration::from_secs(1)).await;
    server.abort();
    std::fs::remove_file(&socket)?;
    Ok(())
}
