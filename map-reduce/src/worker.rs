use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, trace};
use tarpc::{client, context, serde_transport, tokio_serde::formats::Json};

use crate::store;
use crate::{KeyValue, MapFn, Outcome, Phase, ReduceFn, SchedulerClient, TaskAssignment};

/// 32-bit FNV-1a.
struct Fnv1a32(u32);

impl Default for Fnv1a32 {
    fn default() -> Self {
        Fnv1a32(0x811c_9dc5)
    }
}

impl Hasher for Fnv1a32 {
    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 ^= u32::from(*b);
            self.0 = self.0.wrapping_mul(0x0100_0193);
        }
    }

    fn finish(&self) -> u64 {
        u64::from(self.0)
    }
}

/// Reduce bucket selector shared by every worker: 32-bit FNV-1a of the key
/// bytes, masked to 31 bits.
pub fn ihash(key: &str) -> usize {
    let mut hasher = Fnv1a32::default();
    hasher.write(key.as_bytes());
    (hasher.finish() & 0x7fff_ffff) as usize
}

/// Split records into `nreduce` buckets by `ihash(key) % nreduce`.
pub fn partition(records: Vec<KeyValue>, nreduce: usize) -> Vec<Vec<KeyValue>> {
    let mut buckets = vec![Vec::new(); nreduce];
    for kv in records {
        buckets[ihash(&kv.key) % nreduce].push(kv);
    }
    buckets
}

/// Sort records by key and collect the values of each run of equal keys.
pub fn group_by_key(mut records: Vec<KeyValue>) -> Vec<(String, Vec<String>)> {
    records.sort_by(|a, b| a.key.cmp(&b.key));
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for KeyValue { key, value } in records {
        if let Some((k, values)) = groups.last_mut() {
            if *k == key {
                values.push(value);
                continue;
            }
        }
        groups.push((key, vec![value]));
    }
    groups
}

/// A worker process: polls the coordinator, runs one task at a time and
/// reports it.
pub struct Worker {
    /// Directory holding intermediate and output partitions.
    pub dir: PathBuf,
    /// Coordinator endpoint.
    pub socket: PathBuf,
    /// Pause after a `Wait` directive.
    pub wait: Duration,
    pub map: MapFn,
    pub reduce: ReduceFn,
}

impl Worker {
    /// Run until the coordinator says `Exit` or can no longer be reached.
    ///
    /// Failing to read an input or a partition ends the loop with an error and
    /// nothing is reported; the coordinator hands the task out again once it
    /// times out.
    pub async fn launch(&self) -> Result<()> {
        let transport = match serde_transport::unix::connect(&self.socket, Json::default).await {
            Ok(t) => t,
            Err(e) => {
                info!("coordinator unreachable at {:?}: {}", self.socket, e);
                return Ok(());
            }
        };
        let client = SchedulerClient::new(client::Config::default(), transport).spawn();

        loop {
            let task = match client.request_task(context::current()).await {
                Ok(task) => task,
                Err(e) => {
                    info!("coordinator gone: {}", e);
                    return Ok(());
                }
            };
            debug!("got {:?}", task);

            let (id, phase) = match task {
                TaskAssignment::Map { id, input, nreduce } => {
                    self.run_map(id, &input, nreduce)?;
                    (id, Phase::Map)
                }
                TaskAssignment::Reduce { id, nmap } => {
                    self.run_reduce(id, nmap)?;
                    (id, Phase::Reduce)
                }
                TaskAssignment::Wait => {
                    tokio::time::sleep(self.wait).await;
                    continue;
                }
                TaskAssignment::Exit => {
                    info!("job finished, exiting");
                    return Ok(());
                }
            };

            if let Err(e) = client
                .report_task(context::current(), id, phase, Outcome::Completed)
                .await
            {
                info!("coordinator gone while reporting {:?} task {}: {}", phase, id, e);
                return Ok(());
            }
        }
    }

    fn run_map(&self, id: usize, input: &Path, nreduce: usize) -> Result<()> {
        let contents = fs::read_to_string(input)
            .with_context(|| format!("cannot read {}", input.display()))?;
        let records = (self.map)(&input.to_string_lossy(), &contents);
        trace!("map task {} emitted {} records", id, records.len());

        for (r, bucket) in partition(records, nreduce).iter().enumerate() {
            store::write_intermediate(&self.dir, id, r, bucket)?;
        }
        Ok(())
    }

    fn run_reduce(&self, id: usize, nmap: usize) -> Result<()> {
        let mut records = Vec::new();
        for m in 0..nmap {
            records.extend(store::read_intermediate(&self.dir, m, id)?);
        }

        let lines: Vec<(String, String)> = group_by_key(records)
            .into_iter()
            .map(|(key, values)| {
                let value = (self.reduce)(&key, &values);
                (key, value)
            })
            .collect();
        trace!("reduce task {} produced {} keys", id, lines.len());
        store::write_output(&self.dir, id, &lines)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::wc;
    use crate::Coordinator;
    use std::fs;
    use std::thread;
    use tempfile::TempDir;

    fn worker(dir: &Path) -> Worker {
        Worker {
            dir: dir.to_owned(),
            socket: dir.join("unused.sock"),
            wait: Duration::from_millis(10),
            map: wc::map,
            reduce: wc::reduce,
        }
    }

    #[test]
    fn test_ihash_is_stable() {
        assert_eq!(ihash(""), 0x811c_9dc5 & 0x7fff_ffff);
        assert_eq!(ihash("a"), 0xe40c_292c & 0x7fff_ffff);
        assert_eq!(ihash("hello"), ihash(&String::from("hello")));
    }

    #[test]
    fn test_partition() {
        let records = vec![
            KeyValue::new("a", "1"),
            KeyValue::new("b", "1"),
            KeyValue::new("a", "1"),
            KeyValue::new("c", "1"),
        ];
        let buckets = partition(records, 3);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets.iter().map(Vec::len).sum::<usize>(), 4);
        for (r, bucket) in buckets.iter().enumerate() {
            for kv in bucket {
                assert_eq!(ihash(&kv.key) % 3, r);
            }
        }
    }

    #[test]
    fn test_group_by_key() {
        let records = vec![
            KeyValue::new("a", "1"),
            KeyValue::new("b", "1"),
            KeyValue::new("a", "1"),
        ];
        assert_eq!(
            group_by_key(records),
            vec![
                ("a".to_owned(), vec!["1".to_owned(), "1".to_owned()]),
                ("b".to_owned(), vec!["1".to_owned()]),
            ]
        );
        assert!(group_by_key(Vec::new()).is_empty());
    }

    #[test]
    fn test_map_then_reduce() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.txt");
        fs::write(&input, "a b a").unwrap();
        let w = worker(dir.path());

        w.run_map(0, &input, 2).unwrap();
        for r in 0..2 {
            assert!(dir.path().join(store::intermediate_name(0, r)).exists());
        }
        w.run_reduce(0, 1).unwrap();
        w.run_reduce(1, 1).unwrap();

        let mut lines: Vec<String> = (0..2)
            .flat_map(|r| {
                fs::read_to_string(dir.path().join(store::output_name(r)))
                    .unwrap()
                    .lines()
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .collect();
        lines.sort();
        assert_eq!(lines, vec!["a 2", "b 1"]);
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let dir = TempDir::new().unwrap();
        let w = worker(dir.path());
        assert!(w.run_map(0, &dir.path().join("missing.txt"), 1).is_err());
        assert!(w.run_reduce(0, 1).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_coordinator_ends_loop() {
        let dir = TempDir::new().unwrap();
        assert!(worker(dir.path()).launch().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timed_out_reduce_runs_twice() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("mr.sock");
        let input = dir.path().join("in.txt");
        fs::write(&input, "a b a").unwrap();

        let c = Coordinator::new(vec![input.clone()], 1, Duration::from_millis(200)).unwrap();
        let server = c.serve(&socket).await.unwrap();
        let transport = serde_transport::unix::connect(&socket, Json::default)
            .await
            .unwrap();
        let client = SchedulerClient::new(client::Config::default(), transport).spawn();

        let task = client.request_task(context::current()).await.unwrap();
        assert!(matches!(task, TaskAssignment::Map { id: 0, .. }));
        worker(dir.path()).run_map(0, &input, 1).unwrap();
        client
            .report_task(context::current(), 0, Phase::Map, Outcome::Completed)
            .await
            .unwrap();

        // The first holder of reduce task 0 is slow and times out.
        let slow = client.request_task(context::current()).await.unwrap();
        assert_eq!(slow, TaskAssignment::Reduce { id: 0, nmap: 1 });
        assert_eq!(
            client.request_task(context::current()).await.unwrap(),
            TaskAssignment::Wait
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
        let successor = client.request_task(context::current()).await.unwrap();
        assert_eq!(successor, slow);

        // Both attempts run at once and both report.
        thread::scope(|s| {
            for _ in 0..2 {
                let w = worker(dir.path());
                s.spawn(move || {
                    for _ in 0..20 {
                        w.run_reduce(0, 1).unwrap();
                    }
                });
            }
        });
        for _ in 0..2 {
            client
                .report_task(context::current(), 0, Phase::Reduce, Outcome::Completed)
                .await
                .unwrap();
        }

        assert!(c.done());
        assert_eq!(
            client.request_task(context::current()).await.unwrap(),
            TaskAssignment::Exit
        );
        server.abort();

        let output = fs::read_to_string(dir.path().join(store::output_name(0))).unwrap();
        assert_eq!(output, "a 2\nb 1\n");
    }
}
