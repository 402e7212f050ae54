use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use common::comm::{AddTaskMsg, SpaceToUniverseMessage, UniverseToSpaceMessage};
use common::framing::SocketExt;
use common::{Scheduler, SpaceId, Task, TaskId, TaskResult};
use errors::Result;
use universe::state::UniverseRef;
use POLL_DELAY;

/// Universe-side proxy for one registered Space.
///
/// The send service polls the Universe ready queue, tags tasks with the `P`
/// marker on first dispatch, ships them to the Space and tracks them in the
/// running-task map. The receive service processes the Space's result
/// stream against the Universe scheduler. Whichever service observes the
/// connection failing first interrupts the other; the receive service then
/// unregisters the proxy, which re-enqueues everything still running.
pub struct SpaceProxy {
    pub id: SpaceId,
    pub(crate) running: Mutex<HashMap<TaskId, Task>>,
    next_task_id: AtomicI32,
    interrupt: AtomicBool,
}

impl SpaceProxy {
    pub(crate) fn new(id: SpaceId) -> SpaceProxy {
        SpaceProxy {
            id,
            running: Mutex::new(HashMap::new()),
            next_task_id: AtomicI32::new(0),
            interrupt: AtomicBool::new(false),
        }
    }

    pub(crate) fn start(
        universe: UniverseRef,
        id: SpaceId,
        stream: TcpStream,
    ) -> Result<Arc<SpaceProxy>> {
        let writer = stream.try_clone()?;
        let proxy = Arc::new(SpaceProxy::new(id));
        universe.space_proxies.lock().insert(id, proxy.clone());

        let send_universe = universe.clone();
        let send_proxy = proxy.clone();
        let send_service = thread::spawn(move || send_service(&send_universe, &send_proxy, writer));

        let receive_proxy = proxy.clone();
        thread::spawn(move || receive_service(&universe, &receive_proxy, stream, send_service));

        Ok(proxy)
    }

    /// Per-proxy serial for the `P` marker. Distinct from the Universe's
    /// own task counter.
    fn make_task_id(&self) -> i32 {
        self.next_task_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn send_service(universe: &UniverseRef, proxy: &SpaceProxy, mut stream: TcpStream) {
    while !proxy.interrupt.load(Ordering::SeqCst) {
        thread::sleep(POLL_DELAY);
        let mut task = match universe.ready.poll() {
            Some(task) => task,
            None => continue,
        };
        if task.id.space.is_none() {
            task.id.assign_space(proxy.id, proxy.make_task_id());
        }
        // Track before the write: no lock is held across the socket, and a
        // result arriving right after the write finds the entry in place.
        proxy
            .running
            .lock()
            .insert(task.id.clone(), task.clone());
        let msg = UniverseToSpaceMessage::AddTask(AddTaskMsg { task: task.clone() });
        if let Err(e) = stream.write_msg(&msg) {
            debug!("space {} task dispatch failed: {}", proxy.id, e);
            warn!("Send service: space {} is down.", proxy.id);
            proxy.running.lock().remove(&task.id);
            universe.add_ready_task(task);
            return;
        }
        debug!(
            "Universe-Space proxy: task {} (layer {}, coarse {}) dispatched to space {}",
            task.id, task.layer, task.coarse, proxy.id
        );
    }
}

fn receive_service(
    universe: &UniverseRef,
    proxy: &SpaceProxy,
    mut stream: TcpStream,
    send_service: thread::JoinHandle<()>,
) {
    loop {
        let msg: SpaceToUniverseMessage = match stream.read_msg() {
            Ok(msg) => msg,
            Err(e) => {
                debug!("space {} connection lost: {}", proxy.id, e);
                break;
            }
        };
        match msg {
            SpaceToUniverseMessage::Result(m) => process_result(universe, proxy, m.result),
        }
    }
    warn!("Receive service: space {} is down.", proxy.id);
    proxy.interrupt.store(true, Ordering::SeqCst);
    let _ = send_service.join();
    universe.unregister_space(proxy);
}

/// Absorb one result from the Space into the Universe scheduler and clear
/// its running-task entry. A value result that is not absorbed is the final
/// answer for some client and is routed to its Server Proxy.
fn process_result(universe: &UniverseRef, proxy: &SpaceProxy, result: TaskResult) {
    debug!(
        "Universe-Space proxy: result {} (coarse {}) is processing",
        result.id(),
        result.coarse()
    );
    let absorbed = result.process(&**universe);
    match result {
        TaskResult::Coarse(r) => {
            proxy.running.lock().remove(&r.id);
        }
        TaskResult::Value(r) => {
            proxy.running.lock().remove(&r.origin);
            if !absorbed {
                match r.target {
                    // Nothing above this tier to route to.
                    Some(ref target) => warn!(
                        "result {} targets unknown successor {}; dropping",
                        r.id, target
                    ),
                    None => universe.dispatch_result(TaskResult::Value(r)),
                }
            }
        }
    }
}
