use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use common::comm::{AddTaskMsg, ComputerToSpaceMessage, SpaceToComputerMessage};
use common::framing::SocketExt;
use common::{BlockingQueue, ComputerId, Task, TaskId, TaskResult};
use errors::Result;
use space::state::SpaceRef;
use {POLL_DELAY, RESULT_POLL_TIMEOUT};

/// Space-side proxy for one registered Computer.
///
/// The send service feeds the Computer from the Space ready queue, tagging
/// tasks with the `C` marker and keeping the running-task map, and gates
/// dispatch on the Computer's worker capacity. The receive service
/// alternates between the Computer's result stream and the proxy's
/// intermediate result queue, which collects values the Space produced by
/// executing continuations directly.
pub struct ComputerProxy {
    pub id: ComputerId,
    capacity: usize,
    pub(crate) running: Mutex<HashMap<TaskId, Task>>,
    pub(crate) intermediate: Arc<BlockingQueue<TaskResult>>,
    interrupt: AtomicBool,
}

impl ComputerProxy {
    pub(crate) fn new(id: ComputerId, capacity: usize) -> ComputerProxy {
        ComputerProxy {
            id,
            capacity: if capacity == 0 { 1 } else { capacity },
            running: Mutex::new(HashMap::new()),
            intermediate: Arc::new(BlockingQueue::new()),
            interrupt: AtomicBool::new(false),
        }
    }

    pub(crate) fn start(
        space: SpaceRef,
        id: ComputerId,
        capacity: usize,
        stream: TcpStream,
    ) -> Result<Arc<ComputerProxy>> {
        let writer = stream.try_clone()?;
        let proxy = Arc::new(ComputerProxy::new(id, capacity));
        space.computer_proxies.lock().insert(id, proxy.clone());

        let send_space = space.clone();
        let send_proxy = proxy.clone();
        let send_service = thread::spawn(move || send_service(&send_space, &send_proxy, writer));

        let receive_proxy = proxy.clone();
        thread::spawn(move || receive_service(&space, &receive_proxy, stream, send_service));

        Ok(proxy)
    }

    /// Fold one result into the Space. Coarse results and value results
    /// with no local target travel upward with their `C` marker stripped;
    /// everything else is absorbed here. The matching running-task entry is
    /// cleared in all cases. Shared by the receive service and the
    /// unregister drain.
    pub(crate) fn process_incoming(&self, space: &::space::state::SpaceState, result: TaskResult) {
        debug!(
            "Space-Computer proxy: result {} (coarse {}) is processing",
            result.id(),
            result.coarse()
        );
        match result {
            TaskResult::Coarse(r) => {
                self.running.lock().remove(&r.id);
                let mut result = TaskResult::Coarse(r);
                result.strip_computer();
                space.add_result(result);
            }
            TaskResult::Value(r) => {
                let absorbed = space.process_value(&r, &self.intermediate);
                self.running.lock().remove(&r.origin);
                if absorbed {
                    debug!("result {} absorbed by the space", r.id);
                } else {
                    let mut result = TaskResult::Value(r);
                    result.strip_computer();
                    space.add_result(result);
                }
            }
        }
    }
}

fn send_service(space: &SpaceRef, proxy: &ComputerProxy, mut stream: TcpStream) {
    while !proxy.interrupt.load(Ordering::SeqCst) {
        if proxy.running.lock().len() >= proxy.capacity {
            thread::sleep(POLL_DELAY);
            continue;
        }
        let mut task = match space.ready.poll() {
            Some(task) => task,
            None => {
                thread::sleep(POLL_DELAY);
                continue;
            }
        };
        if task.id.space.is_some() && task.id.computer.is_none() {
            task.id.assign_computer(proxy.id);
        }
        proxy
            .running
            .lock()
            .insert(task.id.clone(), task.clone());
        let msg = SpaceToComputerMessage::AddTask(AddTaskMsg { task: task.clone() });
        if let Err(e) = stream.write_msg(&msg) {
            debug!("computer {} task dispatch failed: {}", proxy.id, e);
            warn!("Send service: computer {} is down.", proxy.id);
            proxy.running.lock().remove(&task.id);
            space.ready.put(task);
            return;
        }
        debug!(
            "Space-Computer proxy: task {} (layer {}, coarse {}) dispatched to computer {}",
            task.id, task.layer, task.coarse, proxy.id
        );
    }
}

fn receive_service(
    space: &SpaceRef,
    proxy: &ComputerProxy,
    mut stream: TcpStream,
    send_service: thread::JoinHandle<()>,
) {
    loop {
        // Alternate: a bounded wait on the Computer's stream, then the
        // pending intermediate results, so neither source can starve the
        // other.
        match stream.read_msg_timeout::<ComputerToSpaceMessage>(RESULT_POLL_TIMEOUT) {
            Ok(Some(ComputerToSpaceMessage::Result(m))) => {
                proxy.process_incoming(space, m.result)
            }
            Ok(None) => {}
            Err(e) => {
                debug!("computer {} connection lost: {}", proxy.id, e);
                warn!("Receive service: computer {} is down.", proxy.id);
                proxy.interrupt.store(true, Ordering::SeqCst);
                let _ = send_service.join();
                space.unregister_computer(proxy);
                return;
            }
        }
        while let Some(result) = proxy.intermediate.poll() {
            proxy.process_incoming(space, result);
        }
    }
}
