use common::id::TaskId;
use common::UserValue;

/// What a task computes: a registry key plus an opaque JSON payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub kind: String,
    #[serde(default)]
    pub config: UserValue,
}

/// A unit of work travelling through the fabric.
///
/// A plain task has empty `args` and executes its spec to a value (or, when
/// `coarse`, to a decomposition). A successor task carries one `args` slot
/// per awaited child value and becomes ready when every slot is filled.
/// `target`/`slot` address the successor slot this task's value feeds; the
/// root coarse task has no target, so its value is the final answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub layer: u32,
    pub coarse: bool,
    pub spec: TaskSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub target: Option<TaskId>,
    #[serde(default)]
    pub slot: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub args: Vec<Option<UserValue>>,
}

impl Task {
    /// Number of unfilled argument slots.
    pub fn pending(&self) -> usize {
        self.args.iter().filter(|arg| arg.is_none()).count()
    }

    /// A successor is ready exactly when its last slot is filled.
    pub fn ready(&self) -> bool {
        self.pending() == 0
    }

    /// Deposit a value into a slot. Returns `false` without touching the
    /// slot when it is out of range or already filled, so a duplicate
    /// result produced after a re-dispatch can neither overwrite a value
    /// nor release the successor twice.
    pub fn fill_slot(&mut self, slot: u32, value: UserValue) -> bool {
        match self.args.get_mut(slot as usize) {
            Some(arg) => {
                if arg.is_some() {
                    false
                } else {
                    *arg = Some(value);
                    true
                }
            }
            None => false,
        }
    }
}

/// Result of a completed coarse task: the decomposition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoarseResult {
    pub id: TaskId,
    pub children: Vec<Task>,
    pub successor: Task,
}

/// Result of a completed value-producing task, addressed to one slot of one
/// successor. `origin` is the id of the task whose completion this value
/// records; the proxy that dispatched it uses `origin` to clear its
/// running-task map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueResult {
    pub id: TaskId,
    pub origin: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub target: Option<TaskId>,
    #[serde(default)]
    pub slot: u32,
    pub value: UserValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResult {
    Coarse(CoarseResult),
    Value(ValueResult),
}

impl TaskResult {
    pub fn coarse(&self) -> bool {
        match *self {
            TaskResult::Coarse(_) => true,
            TaskResult::Value(_) => false,
        }
    }

    pub fn id(&self) -> &TaskId {
        match *self {
            TaskResult::Coarse(ref r) => &r.id,
            TaskResult::Value(ref r) => &r.id,
        }
    }

    /// Strip the `C` marker before a result travels upward, so the tier
    /// above sees the pre-assignment id form it tracks. A no-op on ids that
    /// never passed a Computer Proxy.
    pub fn strip_computer(&mut self) {
        match *self {
            TaskResult::Coarse(ref mut r) => r.id.strip_computer(),
            TaskResult::Value(ref mut r) => {
                r.id.strip_computer();
                r.origin.strip_computer();
            }
        }
    }

    /// Offer this result to a scheduler. `true` means absorbed; `false`
    /// means the scheduler has no use for it and it must propagate upward.
    pub fn process<S: Scheduler>(&self, scheduler: &S) -> bool {
        match *self {
            TaskResult::Coarse(ref r) => {
                for child in &r.children {
                    scheduler.add_ready_task(child.clone());
                }
                scheduler.add_successor_task(r.successor.clone());
                true
            }
            TaskResult::Value(ref r) => {
                let target = match r.target {
                    Some(ref target) => target,
                    None => return false,
                };
                match scheduler.deposit(target, r.slot, r.value.clone()) {
                    Deposit::Stored => true,
                    Deposit::Released(successor) => {
                        scheduler.add_ready_task(successor);
                        true
                    }
                    Deposit::Unknown => false,
                }
            }
        }
    }
}

/// Outcome of depositing a value into a scheduler's successor map.
pub enum Deposit {
    /// Stored; the successor still waits for more slots.
    Stored,
    /// This was the last missing slot: the successor has been removed from
    /// the map and is ready to run.
    Released(Task),
    /// No successor with that id is registered here.
    Unknown,
}

/// The scheduler surface shared by the Universe and a Space: a ready queue
/// plus a successor map keyed by task id.
pub trait Scheduler {
    fn add_ready_task(&self, task: Task);
    fn add_successor_task(&self, task: Task);
    fn deposit(&self, target: &TaskId, slot: u32, value: UserValue) -> Deposit;
}

/// Shared deposit implementation over a locked successor map.
pub fn deposit_into(
    map: &::parking_lot::Mutex<::std::collections::HashMap<TaskId, Task>>,
    target: &TaskId,
    slot: u32,
    value: UserValue,
) -> Deposit {
    let mut map = map.lock();
    let released = match map.get_mut(target) {
        None => return Deposit::Unknown,
        Some(successor) => {
            if !successor.fill_slot(slot, value) {
                warn!(
                    "duplicate or invalid value for slot {} of successor {}",
                    slot, target
                );
            }
            successor.ready()
        }
    };
    if released {
        Deposit::Released(map.remove(target).unwrap())
    } else {
        Deposit::Stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    fn successor(id: &str, slots: usize) -> Task {
        Task {
            id: id.parse().unwrap(),
            layer: 1,
            coarse: false,
            spec: TaskSpec {
                kind: "sum".into(),
                config: UserValue::Null,
            },
            target: None,
            slot: 0,
            args: vec![None; slots],
        }
    }

    fn value_result(target: &str, slot: u32, value: i64) -> TaskResult {
        TaskResult::Value(ValueResult {
            id: "F:1:S0:1:U1:P0:9".parse().unwrap(),
            origin: "F:1:S0:1:U1:P0:9".parse().unwrap(),
            target: Some(target.parse().unwrap()),
            slot,
            value: json!(value),
        })
    }

    struct TestScheduler {
        ready: Mutex<Vec<Task>>,
        successors: Mutex<HashMap<super::TaskId, Task>>,
    }

    impl TestScheduler {
        fn new() -> TestScheduler {
            TestScheduler {
                ready: Mutex::new(Vec::new()),
                successors: Mutex::new(HashMap::new()),
            }
        }
    }

    impl Scheduler for TestScheduler {
        fn add_ready_task(&self, task: Task) {
            self.ready.lock().push(task);
        }
        fn add_successor_task(&self, task: Task) {
            self.successors.lock().insert(task.id.clone(), task);
        }
        fn deposit(&self, target: &super::TaskId, slot: u32, value: UserValue) -> Deposit {
            deposit_into(&self.successors, target, slot, value)
        }
    }

    #[test]
    fn slot_writes_are_first_wins() {
        let mut succ = successor("!:F:1:S0:1:U1:P0:5", 2);
        assert!(succ.fill_slot(0, json!(1)));
        assert!(!succ.fill_slot(0, json!(9)));
        assert_eq!(succ.args[0], Some(json!(1)));
        assert!(!succ.ready());
        assert!(succ.fill_slot(1, json!(2)));
        assert!(succ.ready());
        assert!(!succ.fill_slot(7, json!(3)));
    }

    #[test]
    fn coarse_result_is_absorbed() {
        let sched = TestScheduler::new();
        let succ = successor("!:F:1:S0:1:U1:P0:5", 2);
        let child = successor("F:1:S0:1:U1", 0);
        let result = TaskResult::Coarse(CoarseResult {
            id: "F:1:S0:1:U1:P0:5".parse().unwrap(),
            children: vec![child.clone(), child],
            successor: succ.clone(),
        });
        assert!(result.process(&sched));
        assert_eq!(sched.ready.lock().len(), 2);
        assert!(sched.successors.lock().contains_key(&succ.id));
    }

    #[test]
    fn successor_released_exactly_once() {
        // Slot values arriving in reverse order still release one successor.
        let sched = TestScheduler::new();
        sched.add_successor_task(successor("!:F:1:S0:1:U1:P0:5", 2));
        assert!(value_result("!:F:1:S0:1:U1:P0:5", 1, 2).process(&sched));
        assert_eq!(sched.ready.lock().len(), 0);
        assert!(value_result("!:F:1:S0:1:U1:P0:5", 0, 1).process(&sched));
        assert_eq!(sched.ready.lock().len(), 1);
        assert!(sched.successors.lock().is_empty());
        let released = sched.ready.lock().pop().unwrap();
        assert_eq!(released.args, vec![Some(json!(1)), Some(json!(2))]);
    }

    #[test]
    fn unknown_target_propagates() {
        let sched = TestScheduler::new();
        assert!(!value_result("!:F:1:S0:1:U1:P0:5", 0, 1).process(&sched));
        assert!(sched.ready.lock().is_empty());
        assert!(sched.successors.lock().is_empty());
    }

    #[test]
    fn final_value_has_no_target() {
        let sched = TestScheduler::new();
        let result = TaskResult::Value(ValueResult {
            id: "F:1:S0:1:U1:P0:1".parse().unwrap(),
            origin: "F:1:S0:1:U1:P0:1".parse().unwrap(),
            target: None,
            slot: 0,
            value: json!(5),
        });
        assert!(!result.process(&sched));
    }

    #[test]
    fn strip_computer_clears_id_and_origin() {
        let mut result = TaskResult::Value(ValueResult {
            id: "F:1:S0:1:U1:P0:2:C1".parse().unwrap(),
            origin: "F:1:S0:1:U1:P0:2:C1".parse().unwrap(),
            target: None,
            slot: 0,
            value: json!(0),
        });
        result.strip_computer();
        assert_eq!(result.id().to_string(), "F:1:S0:1:U1:P0:2");
    }
}
