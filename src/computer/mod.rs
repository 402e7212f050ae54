//! A Computer: worker process executing tasks for a Space with a pool of
//! local threads. Leaf tasks produce values, coarse tasks decompose, and
//! continuations shipped down by the Space combine their argument slots.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;

use common::comm::{ComputerToSpaceMessage, RegisterComputerMsg, RegisteredMsg, ResultMsg,
                   SpaceToComputerMessage};
use common::framing::SocketExt;
use common::{BlockingQueue, CoarseResult, ComputerId, Task, TaskResult, ValueResult};
use errors::Result;
use tasks::{TaskOutput, TaskRegistry};
use MSG_PROTOCOL;

pub struct ComputerState {
    pub id: ComputerId,
    ready: BlockingQueue<Task>,
    results: BlockingQueue<TaskResult>,
    registry: TaskRegistry,
}

#[derive(Clone)]
pub struct ComputerRef {
    inner: Arc<ComputerState>,
}

impl ::std::ops::Deref for ComputerRef {
    type Target = ComputerState;

    fn deref(&self) -> &ComputerState {
        &self.inner
    }
}

/// Register with a Space and start the socket services plus `workers`
/// worker threads.
pub fn start(
    space_addr: SocketAddr,
    workers: usize,
    registry: TaskRegistry,
) -> Result<ComputerRef> {
    let mut stream = TcpStream::connect(space_addr)?;
    stream.set_nodelay(true)?;
    stream.write_msg(&RegisterComputerMsg {
        protocol: MSG_PROTOCOL.into(),
        workers: workers as u32,
    })?;
    let id = match stream.read_msg()? {
        SpaceToComputerMessage::Registered(RegisteredMsg { id }) => id,
        _ => bail!("unexpected reply to computer registration"),
    };
    info!(
        "Computer {} connected to space at {} with {} workers.",
        id, space_addr, workers
    );

    let computer = ComputerRef {
        inner: Arc::new(ComputerState {
            id,
            ready: BlockingQueue::new(),
            results: BlockingQueue::new(),
            registry,
        }),
    };

    let writer = stream.try_clone()?;
    let reader_computer = computer.clone();
    thread::spawn(move || reader_service(&reader_computer, stream));
    let writer_computer = computer.clone();
    thread::spawn(move || writer_service(&writer_computer, writer));
    for worker_no in 0..workers {
        let worker_computer = computer.clone();
        thread::spawn(move || worker_loop(&worker_computer, worker_no));
    }
    Ok(computer)
}

fn reader_service(computer: &ComputerRef, mut stream: TcpStream) {
    loop {
        match stream.read_msg::<SpaceToComputerMessage>() {
            Ok(SpaceToComputerMessage::AddTask(m)) => computer.ready.put(m.task),
            Ok(SpaceToComputerMessage::Registered(..)) => {}
            Err(e) => {
                warn!("Computer {}: space connection lost: {}", computer.id, e);
                break;
            }
        }
    }
    // Stop the workers and the writer.
    computer.ready.close();
    computer.results.close();
}

fn writer_service(computer: &ComputerRef, mut stream: TcpStream) {
    while let Some(result) = computer.results.take() {
        let msg = ComputerToSpaceMessage::Result(ResultMsg { result });
        if let Err(e) = stream.write_msg(&msg) {
            warn!(
                "Computer {}: result delivery failed: {}",
                computer.id, e
            );
            break;
        }
    }
}

fn worker_loop(computer: &ComputerRef, worker_no: usize) {
    while let Some(task) = computer.ready.take() {
        debug!(
            "Computer {} worker {}: executing task {}:W{} (layer {}, coarse {})",
            computer.id, worker_no, task.id, worker_no, task.layer, task.coarse
        );
        match execute(&computer.registry, task) {
            Ok(result) => computer.results.put(result),
            Err(e) => error!("task execution failed: {}", e),
        }
    }
}

fn execute(registry: &TaskRegistry, task: Task) -> Result<TaskResult> {
    let output = registry.run(&task)?;
    Ok(match output {
        TaskOutput::Value(value) => TaskResult::Value(ValueResult {
            id: task.id.clone(),
            origin: task.id.clone(),
            target: task.target.clone(),
            slot: task.slot,
            value,
        }),
        TaskOutput::Decompose {
            children,
            successor,
        } => TaskResult::Coarse(CoarseResult {
            id: task.id,
            children,
            successor,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{TaskSpec, UserValue};
    use tasks::standard_registry;

    #[test]
    fn executing_a_continuation_produces_its_combined_value() {
        let registry = standard_registry();
        let task = Task {
            id: "!:F:1:S0:1:U1:P0:5:C0".parse().unwrap(),
            layer: 1,
            coarse: false,
            spec: TaskSpec {
                kind: "sum".into(),
                config: UserValue::Null,
            },
            target: Some("!:F:1:S0:1:U1:P0:1".parse().unwrap()),
            slot: 1,
            args: vec![Some(json!(2)), Some(json!(3))],
        };
        match execute(&registry, task).unwrap() {
            TaskResult::Value(r) => {
                assert_eq!(r.value, json!(5));
                assert_eq!(r.slot, 1);
                assert_eq!(r.origin.to_string(), "!:F:1:S0:1:U1:P0:5:C0");
            }
            _ => panic!("expected a value result"),
        }
    }

    #[test]
    fn executing_a_coarse_task_decomposes() {
        let registry = standard_registry();
        let task = Task {
            id: "F:1:S0:1:U1:P0:1:C0".parse().unwrap(),
            layer: 0,
            coarse: true,
            spec: TaskSpec {
                kind: "fib".into(),
                config: json!(3),
            },
            target: None,
            slot: 0,
            args: Vec::new(),
        };
        match execute(&registry, task).unwrap() {
            TaskResult::Coarse(r) => {
                assert_eq!(r.children.len(), 2);
                assert_eq!(r.successor.id.to_string(), "!:F:1:S0:1:U1:P0:1");
            }
            _ => panic!("expected a coarse result"),
        }
    }
}
