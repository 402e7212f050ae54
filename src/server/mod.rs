//! Client-side library: a Server in fabric terms. Owns one connection to
//! the Universe, submits coarse tasks and receives final results.

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use common::comm::{RegisterServerMsg, ServerToUniverseMessage, SubmitMsg, UniverseRegistration,
                   UniverseToServerMessage};
use common::framing::SocketExt;
use common::{Id, ServerId, Task, TaskId, TaskResult, TaskSpec, UserValue, ValueResult};
use errors::Result;
use MSG_PROTOCOL;

pub struct Connection {
    stream: TcpStream,
    pub server_id: ServerId,
    next_seq: Id,
}

impl Connection {
    /// Register with the Universe as a fresh Server.
    pub fn connect(universe_addr: SocketAddr) -> Result<Connection> {
        Connection::register(universe_addr, None)
    }

    /// Reconnect after a Universe recovery, asking for the previous server
    /// id back so recovered results still route here.
    pub fn resume(universe_addr: SocketAddr, server_id: ServerId) -> Result<Connection> {
        Connection::register(universe_addr, Some(server_id))
    }

    fn register(universe_addr: SocketAddr, resume: Option<ServerId>) -> Result<Connection> {
        let mut stream = TcpStream::connect(universe_addr)?;
        stream.set_nodelay(true)?;
        stream.write_msg(&UniverseRegistration::Server(RegisterServerMsg {
            protocol: MSG_PROTOCOL.into(),
            resume,
        }))?;
        let server_id = match stream.read_msg()? {
            UniverseToServerMessage::Registered(m) => m.id,
            _ => bail!("unexpected reply to server registration"),
        };
        debug!("registered with the universe as server {}", server_id);
        Ok(Connection {
            stream,
            server_id,
            next_seq: 0,
        })
    }

    /// Submit a coarse task. Its value, once computed, is delivered back on
    /// this connection carrying the same client-local sequence number.
    pub fn submit(&mut self, kind: &str, config: UserValue) -> Result<TaskId> {
        self.next_seq += 1;
        let id = TaskId::root(self.next_seq, self.server_id, self.next_seq);
        let task = Task {
            id: id.clone(),
            layer: 0,
            coarse: true,
            spec: TaskSpec {
                kind: kind.into(),
                config,
            },
            target: None,
            slot: 0,
            args: Vec::new(),
        };
        self.stream
            .write_msg(&ServerToUniverseMessage::Submit(SubmitMsg { task }))?;
        Ok(id)
    }

    /// Block until the next final result arrives. At-least-once: after a
    /// mid-flight failure the same value may be delivered twice.
    pub fn recv_result(&mut self, timeout: Option<Duration>) -> Result<ValueResult> {
        self.stream.set_read_timeout(timeout)?;
        loop {
            match self.stream.read_msg()? {
                UniverseToServerMessage::Result(m) => match m.result {
                    TaskResult::Value(result) => {
                        self.stream.set_read_timeout(None)?;
                        return Ok(result);
                    }
                    TaskResult::Coarse(r) => {
                        warn!("ignoring unexpected coarse result {}", r.id)
                    }
                },
                UniverseToServerMessage::Registered(..) => {}
            }
        }
    }
}
