use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use common::task::deposit_into;
use common::{BlockingQueue, ComputerId, Deposit, Scheduler, SpaceId, Task, TaskId, TaskResult,
             UserValue, ValueResult};
use space::computer_proxy::ComputerProxy;
use tasks::{TaskOutput, TaskRegistry};

/// Shared state of a Space: the second-level ready queue and successor map,
/// the queue of results travelling up to the Universe, and the Computer
/// registration table.
pub struct SpaceState {
    id: AtomicI32,
    pub(crate) ready: BlockingQueue<Task>,
    pub(crate) successors: Mutex<HashMap<TaskId, Task>>,
    pub(crate) results: BlockingQueue<TaskResult>,
    pub(crate) computer_proxies: Mutex<HashMap<ComputerId, Arc<ComputerProxy>>>,
    next_computer_id: AtomicI32,
    pub(crate) link_epoch: AtomicI32,
    registry: Arc<TaskRegistry>,
}

#[derive(Clone)]
pub struct SpaceRef {
    inner: Arc<SpaceState>,
}

impl Deref for SpaceRef {
    type Target = SpaceState;

    fn deref(&self) -> &SpaceState {
        &self.inner
    }
}

impl SpaceRef {
    pub fn new(registry: TaskRegistry) -> SpaceRef {
        SpaceRef {
            inner: Arc::new(SpaceState {
                id: AtomicI32::new(0),
                ready: BlockingQueue::new(),
                successors: Mutex::new(HashMap::new()),
                results: BlockingQueue::new(),
                computer_proxies: Mutex::new(HashMap::new()),
                next_computer_id: AtomicI32::new(0),
                link_epoch: AtomicI32::new(0),
                registry: Arc::new(registry),
            }),
        }
    }
}

impl SpaceState {
    /// Id assigned by the Universe at registration.
    pub fn id(&self) -> SpaceId {
        self.id.load(Ordering::SeqCst)
    }

    pub(crate) fn set_id(&self, id: SpaceId) {
        self.id.store(id, Ordering::SeqCst);
    }

    pub(crate) fn make_computer_id(&self) -> ComputerId {
        self.next_computer_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Intake from the Universe. A ready trivial continuation (a
    /// value-producing successor with every slot filled) is discharged by
    /// the Space itself instead of being shipped to a Computer; everything
    /// else lands on the ready queue.
    pub(crate) fn intake(&self, task: Task) {
        if task.id.successor && !task.coarse && task.ready() {
            if let Some(intermediate) = self.any_intermediate_queue() {
                self.space_execute_task(task, &intermediate);
                return;
            }
        }
        self.add_ready_task(task);
    }

    /// Intermediate result queue of some registered Computer Proxy, whose
    /// receive service will fold the result into the normal flow.
    fn any_intermediate_queue(&self) -> Option<Arc<BlockingQueue<TaskResult>>> {
        self.computer_proxies
            .lock()
            .values()
            .next()
            .map(|proxy| proxy.intermediate.clone())
    }

    /// Execute a successor task directly and push its value into the given
    /// intermediate result queue.
    pub fn space_execute_task(&self, task: Task, intermediate: &BlockingQueue<TaskResult>) {
        self.successors.lock().remove(&task.id);
        match self.registry.run(&task) {
            Ok(TaskOutput::Value(value)) => {
                let result = ValueResult {
                    id: task.id.clone(),
                    origin: task.id.clone(),
                    target: task.target.clone(),
                    slot: task.slot,
                    value,
                };
                debug!("Space direct execution: {}", result.id);
                intermediate.put(TaskResult::Value(result));
            }
            Ok(TaskOutput::Decompose { .. }) => {
                error!(
                    "continuation {} produced a decomposition; dropping it",
                    task.id
                );
            }
            Err(e) => error!("direct execution of {} failed: {}", task.id, e),
        }
    }

    /// Offer a value result to this Space's successor map. A released
    /// value-producing successor is discharged directly; a coarse one goes
    /// back on the ready queue. `false` means the target is unknown here
    /// and the result must travel upward.
    pub(crate) fn process_value(
        &self,
        result: &ValueResult,
        intermediate: &BlockingQueue<TaskResult>,
    ) -> bool {
        let target = match result.target {
            Some(ref target) => target,
            None => return false,
        };
        match self.deposit(target, result.slot, result.value.clone()) {
            Deposit::Stored => true,
            Deposit::Released(successor) => {
                if !successor.coarse {
                    self.space_execute_task(successor, intermediate);
                } else {
                    self.add_ready_task(successor);
                }
                true
            }
            Deposit::Unknown => false,
        }
    }

    /// Queue a result for upward propagation to the Universe.
    pub(crate) fn add_result(&self, result: TaskResult) {
        self.results.put(result);
    }

    /// Remove a Computer Proxy: drain its intermediate result queue through
    /// normal processing, then re-enqueue every task it was running.
    pub(crate) fn unregister_computer(&self, proxy: &ComputerProxy) {
        self.computer_proxies.lock().remove(&proxy.id);
        while let Some(result) = proxy.intermediate.poll() {
            debug!("unregister drain: result {}", result.id());
            proxy.process_incoming(self, result);
        }
        let tasks: Vec<Task> = {
            let mut running = proxy.running.lock();
            running.drain().map(|(_, task)| task).collect()
        };
        for task in tasks {
            debug!("saving computer task {}", task.id);
            self.ready.put(task);
        }
        warn!("Computer {} failed.", proxy.id);
    }

    pub fn ready_task_count(&self) -> usize {
        self.ready.len()
    }

    pub fn successor_count(&self) -> usize {
        self.successors.lock().len()
    }

    pub fn registered_computers(&self) -> usize {
        self.computer_proxies.lock().len()
    }
}

impl Scheduler for SpaceState {
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

#[cfg(test)]
mod tests {
    use super::*;
    use common::TaskSpec;
    use tasks::standard_registry;

    fn space() -> SpaceRef {
        SpaceRef::new(standard_registry())
    }

    fn successor(id: &str, coarse: bool) -> Task {
        Task {
            id: id.parse().unwrap(),
            layer: 1,
            coarse,
            spec: TaskSpec {
                kind: "sum".into(),
                config: UserValue::Null,
            },
            target: None,
            slot: 0,
            args: vec![None, None],
        }
    }

    fn value(target: &str, slot: u32, value: i64) -> ValueResult {
        ValueResult {
            id: "F:1:S0:1:U1:P0:9:C0".parse().unwrap(),
            origin: "F:1:S0:1:U1:P0:9:C0".parse().unwrap(),
            target: Some(target.parse().unwrap()),
            slot,
            value: json!(value),
        }
    }

    #[test]
    fn reverse_order_slots_release_one_enqueue() {
        // Two value results for the same successor arriving in reverse slot
        // order produce exactly one ready enqueue.
        let s = space();
        s.add_successor_task(successor("!:F:1:S0:1:U1:P0:5", true));
        let intermediate = BlockingQueue::new();
        assert!(s.process_value(&value("!:F:1:S0:1:U1:P0:5", 1, 2), &intermediate));
        assert_eq!(s.ready_task_count(), 0);
        assert!(s.process_value(&value("!:F:1:S0:1:U1:P0:5", 0, 1), &intermediate));
        assert_eq!(s.ready_task_count(), 1);
        assert!(s.successors.lock().is_empty());
        assert!(intermediate.is_empty());
    }

    #[test]
    fn released_trivial_continuation_is_discharged_directly() {
        let s = space();
        s.add_successor_task(successor("!:F:1:S0:1:U1:P0:5", false));
        let intermediate = BlockingQueue::new();
        assert!(s.process_value(&value("!:F:1:S0:1:U1:P0:5", 0, 3), &intermediate));
        assert!(s.process_value(&value("!:F:1:S0:1:U1:P0:5", 1, 2), &intermediate));
        assert_eq!(s.ready_task_count(), 0);
        match intermediate.poll() {
            Some(TaskResult::Value(r)) => {
                assert_eq!(r.value, json!(5));
                assert_eq!(r.id.to_string(), "!:F:1:S0:1:U1:P0:5");
            }
            other => panic!("expected a direct execution value, got {:?}", other),
        }
    }

    #[test]
    fn orphan_value_result_is_not_absorbed() {
        let s = space();
        let intermediate = BlockingQueue::new();
        assert!(!s.process_value(&value("!:F:1:S0:1:U1:P0:5", 0, 1), &intermediate));
        assert!(s.successors.lock().is_empty());
        assert_eq!(s.ready_task_count(), 0);
        assert!(intermediate.is_empty());
    }

    #[test]
    fn intake_queues_plain_tasks() {
        let s = space();
        let task = Task {
            id: "F:1:S0:1:U1:P0:1".parse().unwrap(),
            layer: 0,
            coarse: true,
            spec: TaskSpec {
                kind: "fib".into(),
                config: json!(4),
            },
            target: None,
            slot: 0,
            args: Vec::new(),
        };
        s.intake(task);
        assert_eq!(s.ready_task_count(), 1);
    }

    #[test]
    fn intake_without_computers_queues_ready_continuations() {
        let s = space();
        let mut cont = successor("!:F:1:S0:1:U1:P0:5", false);
        cont.args = vec![Some(json!(1)), Some(json!(2))];
        s.intake(cont);
        // No Computer registered: falls back to the ready queue.
        assert_eq!(s.ready_task_count(), 1);
    }
}
