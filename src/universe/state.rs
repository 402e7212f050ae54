use std::collections::HashMap;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use common::task::deposit_into;
use common::{BlockingQueue, Deposit, Scheduler, ServerId, SpaceId, Task, TaskId, TaskResult,
             UserValue};
use errors::Result;
use universe::checkpoint::{self, Snapshot, SNAPSHOT_VERSION};
use universe::server_proxy::ServerProxy;
use universe::space_proxy::SpaceProxy;

/// Shared state of the Universe: the top-level ready queue and successor
/// map, the registration tables, and the three id counters. Proxy threads
/// hold a `UniverseRef` each.
pub struct UniverseState {
    pub(crate) ready: BlockingQueue<Task>,
    pub(crate) successors: Mutex<HashMap<TaskId, Task>>,
    pub(crate) server_proxies: Mutex<HashMap<ServerId, Arc<ServerProxy>>>,
    pub(crate) space_proxies: Mutex<HashMap<SpaceId, Arc<SpaceProxy>>>,
    next_server_id: AtomicI32,
    next_space_id: AtomicI32,
    next_task_id: AtomicI32,
    recovery_path: PathBuf,
}

#[derive(Clone)]
pub struct UniverseRef {
    inner: Arc<UniverseState>,
}

impl Deref for UniverseRef {
    type Target = UniverseState;

    fn deref(&self) -> &UniverseState {
        &self.inner
    }
}

impl UniverseRef {
    pub fn new(recovery_path: PathBuf) -> UniverseRef {
        info!("Universe started.");
        UniverseRef {
            inner: Arc::new(UniverseState {
                ready: BlockingQueue::new(),
                successors: Mutex::new(HashMap::new()),
                server_proxies: Mutex::new(HashMap::new()),
                space_proxies: Mutex::new(HashMap::new()),
                next_server_id: AtomicI32::new(0),
                next_space_id: AtomicI32::new(0),
                next_task_id: AtomicI32::new(0),
                recovery_path,
            }),
        }
    }

    /// Recovery-mode constructor: reload the queues, maps and counters from
    /// the recovery file. Tasks that were running on a Space are re-enqueued
    /// (their connections did not survive). A failed read logs and starts
    /// fresh.
    pub fn recover(recovery_path: PathBuf) -> UniverseRef {
        info!("Universe is recovering...");
        let snapshot = match checkpoint::read_snapshot(&recovery_path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Universe failed to recover ({}). Relaunching...", e);
                return UniverseRef::new(recovery_path);
            }
        };
        let universe = UniverseRef {
            inner: Arc::new(UniverseState {
                ready: BlockingQueue::new(),
                successors: Mutex::new(
                    snapshot
                        .successors
                        .into_iter()
                        .map(|task| (task.id.clone(), task))
                        .collect(),
                ),
                server_proxies: Mutex::new(HashMap::new()),
                space_proxies: Mutex::new(HashMap::new()),
                next_server_id: AtomicI32::new(snapshot.next_server_id),
                next_space_id: AtomicI32::new(snapshot.next_space_id),
                next_task_id: AtomicI32::new(snapshot.next_task_id),
                recovery_path,
            }),
        };
        for task in snapshot.ready {
            universe.ready.put(task);
        }
        for task in snapshot.running {
            debug!("re-dispatching recovered task {}", task.id);
            universe.ready.put(task);
        }
        info!(
            "Universe recovered from checkpoint written at {}.",
            snapshot.written_at
        );
        universe
    }
}

impl UniverseState {
    /// Generate a task id for the `U` marker.
    pub(crate) fn make_task_id(&self) -> i32 {
        self.next_task_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn make_space_id(&self) -> SpaceId {
        self.next_space_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Assign a server id, honoring a resume request when the previous id
    /// was really handed out before and is currently free. Ids are never
    /// re-issued to a different client.
    pub(crate) fn assign_server_id(&self, resume: Option<ServerId>) -> ServerId {
        if let Some(id) = resume {
            if id >= 0 && id < self.next_server_id.load(Ordering::SeqCst)
                && !self.server_proxies.lock().contains_key(&id)
            {
                info!("Server {} resumed.", id);
                return id;
            }
            warn!("Server asked to resume id {} which is not available.", id);
        }
        self.next_server_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Route a final result to the Server Proxy its `S` segment names. If
    /// the server is gone the result is dropped silently.
    pub(crate) fn dispatch_result(&self, result: TaskResult) {
        let server_id = result.id().server_id;
        let proxies = self.server_proxies.lock();
        match proxies.get(&server_id) {
            Some(proxy) => proxy.add_result(result),
            None => debug!(
                "dropping result {} for unregistered server {}",
                result.id(),
                server_id
            ),
        }
    }

    /// Remove a Server Proxy and purge its unstarted tasks from the ready
    /// queue.
    pub(crate) fn unregister_server(&self, proxy: &ServerProxy) {
        self.server_proxies.lock().remove(&proxy.id);
        self.ready.retain(|task| task.id.server_id != proxy.id);
        warn!("Server {} is down.", proxy.id);
    }

    /// Remove a Space Proxy and re-enqueue every task it was running.
    pub(crate) fn unregister_space(&self, proxy: &SpaceProxy) {
        self.space_proxies.lock().remove(&proxy.id);
        let tasks: Vec<Task> = {
            let mut running = proxy.running.lock();
            running.drain().map(|(_, task)| task).collect()
        };
        for task in tasks {
            debug!("saving space task {}", task.id);
            self.ready.put(task);
        }
        warn!("Space {} is down.", proxy.id);
    }

    /// Serialize the persistent state to the recovery file.
    pub fn checkpoint(&self) -> Result<()> {
        // Successor map before ready queue: a successor released between the
        // two reads is then captured at least once (possibly twice), never
        // lost.
        let successors: Vec<Task> = self.successors.lock().values().cloned().collect();
        let ready = self.ready.snapshot();
        let mut running = Vec::new();
        for proxy in self.space_proxies.lock().values() {
            running.extend(proxy.running.lock().values().cloned());
        }
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            written_at: Utc::now(),
            next_server_id: self.next_server_id.load(Ordering::SeqCst),
            next_space_id: self.next_space_id.load(Ordering::SeqCst),
            next_task_id: self.next_task_id.load(Ordering::SeqCst),
            ready,
            successors,
            running,
        };
        checkpoint::write_snapshot(&self.recovery_path, &snapshot)
    }

    pub fn ready_task_count(&self) -> usize {
        self.ready.len()
    }

    pub fn successor_count(&self) -> usize {
        self.successors.lock().len()
    }

    pub fn registered_servers(&self) -> usize {
        self.server_proxies.lock().len()
    }

    pub fn registered_spaces(&self) -> usize {
        self.space_proxies.lock().len()
    }
}

impl Scheduler for UniverseState {
    fn add_ready_task(&self, task: Task) {
        self.ready.put(task);
    }

    fn add_successor_task(&self, task: Task) {
        self.successors.lock().insert(task.id.clone(), task);
    }

    fn deposit(&self, target: &TaskId, slot: u32, value: UserValue) -> Deposit {
        deposit_into(&self.successors, target, slot, value)
    }
}
