use std::path::PathBuf;
use std::time::Duration;

use structopt::StructOpt;

use map_reduce::app::wc;
use map_reduce::{coordinator_sock, Worker, DEFAULT_WAIT};

#[derive(StructOpt, Debug)]
#[structopt(name = "worker", version = env!("CARGO_PKG_VERSION"), author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    /// Coordinator socket [default: /var/tmp/map-reduce-<uid>.sock]
    #[structopt(short, long, parse(from_os_str))]
    socket: Option<PathBuf>,

    /// Directory for intermediate and output files
    #[structopt(short, long, default_value = ".", parse(from_os_str))]
    dir: PathBuf,

    /// Milliseconds to sleep when there is no task to run [default: 1000]
    #[structopt(short, long)]
    wait: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    let w = Worker {
        dir: opt.dir,
        socket: opt.socket.unwrap_or_else(coordinator_sock),
        wait: opt.wait.map_or(DEFAULT_WAIT, Duration::from_millis),
        map: wc::map,
        reduce: wc::reduce,
    };
    w.launch().await?;
    Ok(())
}
