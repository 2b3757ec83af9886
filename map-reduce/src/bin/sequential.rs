use std::fs;
use std::path::PathBuf;

use log::trace;
use structopt::StructOpt;

use map_reduce::app::wc::{map, reduce};
use map_reduce::{group_by_key, partition, store};

#[derive(StructOpt, Debug)]
#[structopt(name = "sequential", version = env!("CARGO_PKG_VERSION"), author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    /// Files to process
    #[structopt(name = "FILE", parse(from_os_str))]
    files: Vec<PathBuf>,

    /// Directory to write mr-seq-<r> files to
    #[structopt(short, long, default_value = ".", parse(from_os_str))]
    dir: PathBuf,

    #[structopt(long, default_value = "10")]
    nreduce: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    if opt.nreduce == 0 {
        return Err("--nreduce should be non-zero".into());
    }

    let mut records = Vec::new();
    for fname in opt.files.iter() {
        let contents = fs::read_to_string(fname)?;
        records.extend(map(&fname.to_string_lossy(), &contents));
    }

    // Same buckets as the distributed run, so files can be compared one to one.
    for (r, bucket) in partition(records, opt.nreduce).into_iter().enumerate() {
        let path = opt.dir.join(format!("mr-seq-{}", r));
        let lines: Vec<(String, String)> = group_by_key(bucket)
            .into_iter()
            .map(|(k, vs)| {
                let v = reduce(&k, &vs);
                (k, v)
            })
            .collect();
        store::write_atomic(&path, |f| {
            use std::io::Write;
            for (k, v) in lines.iter() {
                writeln!(f, "{} {}", k, v)?;
            }
            Ok(())
        })?;
        trace!("output {:?}", path);
    }
    Ok(())
}
