//! On-disk partitions shared between workers.
//!
//! Every file is written through [`AtomicFile`]: the content goes to a
//! temporary file next to the target which is then renamed over it, so a
//! reader sees either the previous complete file or the new complete file.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior::AllowOverwrite};
use log::trace;

use crate::KeyValue;

/// Name of the partition produced by map task `m` for reduce task `r`.
pub fn intermediate_name(m: usize, r: usize) -> String {
    format!("mr-{}-{}", m, r)
}

pub fn output_name(r: usize) -> String {
    format!("mr-out-{}", r)
}

/// Atomically replace `path` with whatever `f` writes.
pub fn write_atomic<F>(path: &Path, f: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> std::io::Result<()>,
{
    AtomicFile::new(path, AllowOverwrite)
        .write(|file| {
            let mut w = BufWriter::new(file);
            f(&mut w)?;
            w.flush()
        })
        .with_context(|| format!("cannot write {}", path.display()))?;
    trace!("wrote {:?}", path);
    Ok(())
}

pub fn write_intermediate(dir: &Path, m: usize, r: usize, records: &[KeyValue]) -> Result<PathBuf> {
    let path = dir.join(intermediate_name(m, r));
    write_atomic(&path, |w| {
        for kv in records {
            serde_json::to_writer(&mut *w, kv)?;
            w.write_all(b"\n")?;
        }
        Ok(())
    })?;
    Ok(path)
}

/// Decode every record of partition `(m, r)`.
pub fn read_intermediate(dir: &Path, m: usize, r: usize) -> Result<Vec<KeyValue>> {
    let path = dir.join(intermediate_name(m, r));
    let file = File::open(&path).with_context(|| format!("cannot open {}", path.display()))?;
    serde_json::Deserializer::from_reader(BufReader::new(file))
        .into_iter::<KeyValue>()
        .map(|kv| kv.with_context(|| format!("corrupt record in {}", path.display())))
        .collect()
}

/// Write one `<key> <value>` line per entry of `lines`.
pub fn write_output(dir: &Path, r: usize, lines: &[(String, String)]) -> Result<PathBuf> {
    let path = dir.join(output_name(r));
    write_atomic(&path, |w| {
        for (k, v) in lines {
            writeln!(w, "{} {}", k, v)?;
        }
        Ok(())
    })?;
    Ok(path)
}
