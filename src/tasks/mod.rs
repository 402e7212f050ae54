//! Task execution registry and the built-in task family.
//!
//! Computers (and Spaces, for continuations they discharge directly) look
//! tasks up by their spec's `kind` and run the registered function.

use std::collections::HashMap;

use common::{Task, TaskSpec, UserValue};
use errors::Result;

/// What executing a task produced: either a value addressed to the task's
/// target slot, or a decomposition into children plus a continuation.
pub enum TaskOutput {
    Value(UserValue),
    Decompose {
        children: Vec<Task>,
        successor: Task,
    },
}

/// Alias type for a task function.
pub type TaskFn = Box<dyn Fn(&Task) -> Result<TaskOutput> + Send + Sync>;

pub struct TaskRegistry {
    tasks: HashMap<String, TaskFn>,
}

impl TaskRegistry {
    pub fn new() -> TaskRegistry {
        TaskRegistry {
            tasks: HashMap::new(),
        }
    }

    pub fn add_task<S, F>(&mut self, kind: S, task_fn: F)
    where
        S: Into<String>,
        F: 'static + Fn(&Task) -> Result<TaskOutput> + Send + Sync,
    {
        let key: String = kind.into();
        if self.tasks.contains_key(&key) {
            panic!("can't add task {:?}: already present", &key);
        }
        self.tasks.insert(key, Box::new(task_fn));
    }

    pub fn run(&self, task: &Task) -> Result<TaskOutput> {
        match self.tasks.get(&task.spec.kind) {
            None => bail!("task kind {:?} not registered", task.spec.kind),
            Some(task_fn) => task_fn(task),
        }
    }
}

/// Registry with the built-in task family.
pub fn standard_registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry.add_task("fib", task_fib);
    registry.add_task("sum", task_sum);
    registry
}

/// Naive Fibonacci. `fib(n)` for n >= 2 decomposes into `fib(n-1)` and
/// `fib(n-2)` feeding a two-slot `sum` continuation; smaller n is a leaf
/// producing n itself.
fn task_fib(task: &Task) -> Result<TaskOutput> {
    let n = match task.spec.config.as_i64() {
        Some(n) if n >= 0 => n,
        _ => bail!("fib requires a non-negative integer argument"),
    };
    if n < 2 {
        return Ok(TaskOutput::Value(json!(n)));
    }
    let successor = Task {
        id: task.id.continuation(),
        layer: task.layer,
        coarse: false,
        spec: TaskSpec {
            kind: "sum".into(),
            config: UserValue::Null,
        },
        target: task.target.clone(),
        slot: task.slot,
        args: vec![None, None],
    };
    let children = (0..2)
        .map(|slot| {
            let m = n - 1 - slot as i64;
            Task {
                id: task.id.child_base(),
                layer: task.layer + 1,
                coarse: m >= 2,
                spec: TaskSpec {
                    kind: "fib".into(),
                    config: json!(m),
                },
                target: Some(successor.id.clone()),
                slot,
                args: Vec::new(),
            }
        })
        .collect();
    Ok(TaskOutput::Decompose {
        children,
        successor,
    })
}

/// Continuation summing all of its argument slots.
fn task_sum(task: &Task) -> Result<TaskOutput> {
    let mut total = 0i64;
    for arg in &task.args {
        match *arg {
            Some(ref value) => match value.as_i64() {
                Some(n) => total += n,
                None => bail!("sum argument is not an integer: {}", value),
            },
            None => bail!("sum continuation executed with an unfilled slot"),
        }
    }
    Ok(TaskOutput::Value(json!(total)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fib_task(n: i64) -> Task {
        Task {
            id: "F:1:S0:1:U1:P0:5:C1".parse().unwrap(),
            layer: 0,
            coarse: n >= 2,
            spec: TaskSpec {
                kind: "fib".into(),
                config: json!(n),
            },
            target: None,
            slot: 0,
            args: Vec::new(),
        }
    }

    #[test]
    fn fib_leaf_produces_value() {
        let registry = standard_registry();
        match registry.run(&fib_task(1)).unwrap() {
            TaskOutput::Value(v) => assert_eq!(v, json!(1)),
            _ => panic!("expected a value"),
        }
    }

    #[test]
    fn fib_decomposition_shape() {
        let registry = standard_registry();
        match registry.run(&fib_task(5)).unwrap() {
            TaskOutput::Decompose {
                children,
                successor,
            } => {
                assert_eq!(successor.id.to_string(), "!:F:1:S0:1:U1:P0:5");
                assert!(!successor.coarse);
                assert_eq!(successor.pending(), 2);
                assert_eq!(children.len(), 2);
                for (slot, child) in children.iter().enumerate() {
                    // Children restart below the Space tier: a fresh `P`
                    // serial is assigned on their next dispatch.
                    assert_eq!(child.id.to_string(), "F:1:S0:1:U1");
                    assert_eq!(child.target.as_ref(), Some(&successor.id));
                    assert_eq!(child.slot as usize, slot);
                    assert_eq!(child.layer, 1);
                }
                assert_eq!(children[0].spec.config, json!(4));
                assert!(children[0].coarse);
                assert_eq!(children[1].spec.config, json!(3));
                assert!(children[1].coarse);
            }
            _ => panic!("expected a decomposition"),
        }
    }

    #[test]
    fn sum_combines_slots() {
        let registry = standard_registry();
        let task = Task {
            id: "!:F:1:S0:1:U1:P0:5".parse().unwrap(),
            layer: 1,
            coarse: false,
            spec: TaskSpec {
                kind: "sum".into(),
                config: UserValue::Null,
            },
            target: None,
            slot: 0,
            args: vec![Some(json!(3)), Some(json!(2))],
        };
        match registry.run(&task).unwrap() {
            TaskOutput::Value(v) => assert_eq!(v, json!(5)),
            _ => panic!("expected a value"),
        }
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let registry = standard_registry();
        let mut task = fib_task(1);
        task.spec.kind = "frobnicate".into();
        assert!(registry.run(&task).is_err());
    }

    #[test]
    #[should_panic(expected = "already present")]
    fn registry_rejects_duplicates() {
        let mut registry = standard_registry();
        registry.add_task("fib", |_| Ok(TaskOutput::Value(UserValue::Null)));
    }
}
