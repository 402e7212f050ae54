use std::net::TcpStream;
use std::sync::Arc;
use std::thread;

use common::comm::{ResultMsg, ServerToUniverseMessage, UniverseToServerMessage};
use common::framing::SocketExt;
use common::{BlockingQueue, Scheduler, ServerId, TaskResult};
use errors::Result;
use universe::state::UniverseRef;

/// Universe-side proxy for one registered Server (client).
///
/// The send service reads submitted coarse tasks off the connection, tags
/// them with the `U` marker and feeds the Universe ready queue; the receive
/// service drains the proxy's result queue back to the client. Either
/// service failing means the client is gone: the surviving thread is woken,
/// joined, and the proxy unregisters itself.
pub struct ServerProxy {
    pub id: ServerId,
    results: BlockingQueue<TaskResult>,
}

impl ServerProxy {
    pub(crate) fn new(id: ServerId) -> ServerProxy {
        ServerProxy {
            id,
            results: BlockingQueue::new(),
        }
    }

    pub(crate) fn start(
        universe: UniverseRef,
        id: ServerId,
        stream: TcpStream,
    ) -> Result<Arc<ServerProxy>> {
        let writer = stream.try_clone()?;
        let proxy = Arc::new(ServerProxy::new(id));
        universe
            .server_proxies
            .lock()
            .insert(id, proxy.clone());

        let receive_proxy = proxy.clone();
        let receive_service = thread::spawn(move || receive_service(&receive_proxy, writer));

        let send_proxy = proxy.clone();
        thread::spawn(move || send_service(&universe, &send_proxy, stream, receive_service));

        Ok(proxy)
    }

    /// Queue a result for delivery to the client.
    pub(crate) fn add_result(&self, result: TaskResult) {
        self.results.put(result);
    }
}

fn send_service(
    universe: &UniverseRef,
    proxy: &ServerProxy,
    mut stream: TcpStream,
    receive_service: thread::JoinHandle<()>,
) {
    loop {
        let msg: ServerToUniverseMessage = match stream.read_msg() {
            Ok(msg) => msg,
            Err(e) => {
                debug!("server {} connection lost: {}", proxy.id, e);
                break;
            }
        };
        match msg {
            ServerToUniverseMessage::Submit(m) => {
                let mut task = m.task;
                task.id.assign_universe_seq(universe.make_task_id());
                debug!(
                    "Universe-Server proxy: task {} added to the ready queue",
                    task.id
                );
                universe.add_ready_task(task);
            }
        }
    }
    // Wake the receive service out of its queue wait and let it finish
    // before the re-dispatch sweep runs.
    proxy.results.close();
    let _ = receive_service.join();
    universe.unregister_server(proxy);
}

fn receive_service(proxy: &ServerProxy, mut stream: TcpStream) {
    while let Some(result) = proxy.results.take() {
        let msg = UniverseToServerMessage::Result(ResultMsg { result });
        if let Err(e) = stream.write_msg(&msg) {
            debug!("server {} result delivery failed: {}", proxy.id, e);
            break;
        }
    }
}
