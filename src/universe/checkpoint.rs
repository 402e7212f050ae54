//! Periodic snapshot of the Universe's persistent state.
//!
//! Only the queues, maps and id counters are encoded, with an explicit
//! schema version; proxy threads are recreated when peers reconnect, never
//! restored from the file.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_cbor;

use common::Task;
use errors::Result;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub written_at: DateTime<Utc>,
    pub next_server_id: i32,
    pub next_space_id: i32,
    pub next_task_id: i32,
    pub ready: Vec<Task>,
    pub successors: Vec<Task>,
    /// Tasks dispatched to Spaces but not yet resolved. Their connections do
    /// not survive a restart, so recovery re-enqueues them.
    pub running: Vec<Task>,
}

pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let data = serde_cbor::to_vec(snapshot)?;
    // Write-then-rename so a crash mid-checkpoint cannot corrupt the
    // previous recovery file.
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let mut data = Vec::new();
    fs::File::open(path)?.read_to_end(&mut data)?;
    let snapshot: Snapshot = serde_cbor::from_slice(&data)?;
    if snapshot.version != SNAPSHOT_VERSION {
        bail!(
            "recovery file has snapshot version {}, expected {}",
            snapshot.version,
            SNAPSHOT_VERSION
        );
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    extern crate tempdir;

    use self::tempdir::TempDir;
    use super::*;
    use common::TaskSpec;

    fn task(id: &str) -> Task {
        Task {
            id: id.parse().unwrap(),
            layer: 0,
            coarse: true,
            spec: TaskSpec {
                kind: "fib".into(),
                config: json!(3),
            },
            target: None,
            slot: 0,
            args: Vec::new(),
        }
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = TempDir::new("snapshot_round_trip").unwrap();
        let path = dir.path().join("recovery.bk");
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            written_at: Utc::now(),
            next_server_id: 2,
            next_space_id: 1,
            next_task_id: 17,
            ready: vec![task("F:1:S0:1:U1"), task("F:1:S0:1:U1")],
            successors: vec![task("!:F:1:S0:1:U1:P0:5")],
            running: vec![task("F:1:S0:1:U1:P0:2")],
        };
        write_snapshot(&path, &snapshot).unwrap();
        let restored = read_snapshot(&path).unwrap();
        assert_eq!(restored.ready, snapshot.ready);
        assert_eq!(restored.successors, snapshot.successors);
        assert_eq!(restored.running, snapshot.running);
        assert_eq!(restored.next_task_id, 17);
    }

    #[test]
    fn unreadable_snapshot_is_an_error() {
        let dir = TempDir::new("unreadable_snapshot").unwrap();
        let path = dir.path().join("recovery.bk");
        assert!(read_snapshot(&path).is_err());
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"not a snapshot").unwrap();
        drop(file);
        assert!(read_snapshot(&path).is_err());
    }
}
