//! The Universe: root of the fabric. Accepts Server and Space
//! registrations, brokers coarse tasks downward and final results upward,
//! and checkpoints its persistent state on a fixed cadence.

pub mod checkpoint;
pub mod state;
pub(crate) mod server_proxy;
pub(crate) mod space_proxy;

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::thread;

use common::comm::{RegisteredMsg, UniverseRegistration, UniverseToServerMessage,
                   UniverseToSpaceMessage};
use common::framing::SocketExt;
use errors::Result;
use {CHECKPOINT_INTERVAL, MSG_PROTOCOL, RECOVERY_FILE};

pub use self::state::{UniverseRef, UniverseState};

/// Bind the listener and start accepting registrations. Returns the bound
/// address (useful with an ephemeral port).
pub fn start(universe: &UniverseRef, listen: SocketAddr) -> Result<SocketAddr> {
    let listener = TcpListener::bind(listen)?;
    let addr = listener.local_addr()?;
    info!("Universe listening on {}", addr);
    let accept_universe = universe.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let universe = accept_universe.clone();
                    thread::spawn(move || {
                        if let Err(e) = register_peer(universe, stream) {
                            warn!("peer registration failed: {}", e);
                        }
                    });
                }
                Err(e) => warn!("accepting a connection failed: {}", e),
            }
        }
    });
    Ok(addr)
}

/// Run the Universe process: normal or recovery construction, listener,
/// then the checkpoint loop forever.
pub fn run(listen: SocketAddr, recovery: bool) -> Result<()> {
    let recovery_path = PathBuf::from(RECOVERY_FILE);
    let universe = if recovery {
        UniverseRef::recover(recovery_path)
    } else {
        UniverseRef::new(recovery_path)
    };
    start(&universe, listen)?;
    loop {
        thread::sleep(CHECKPOINT_INTERVAL);
        match universe.checkpoint() {
            Ok(()) => info!("Checkpoint taken."),
            Err(e) => error!("Checkpoint failed: {}", e),
        }
    }
}

/// Handshake on a fresh connection: the first frame names the peer type,
/// the reply carries the assigned id, then the per-peer services take over
/// the stream.
fn register_peer(universe: UniverseRef, mut stream: TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;
    let registration: UniverseRegistration = stream.read_msg()?;
    match registration {
        UniverseRegistration::Server(msg) => {
            check_protocol(&msg.protocol)?;
            let id = universe.assign_server_id(msg.resume);
            stream.write_msg(&UniverseToServerMessage::Registered(RegisteredMsg { id }))?;
            server_proxy::ServerProxy::start(universe, id, stream)?;
            info!("Server {} registered.", id);
        }
        UniverseRegistration::Space(msg) => {
            check_protocol(&msg.protocol)?;
            let id = universe.make_space_id();
            stream.write_msg(&UniverseToSpaceMessage::Registered(RegisteredMsg { id }))?;
            space_proxy::SpaceProxy::start(universe, id, stream)?;
            info!("Space {} registered.", id);
        }
    }
    Ok(())
}

fn check_protocol(protocol: &str) -> Result<()> {
    if protocol != MSG_PROTOCOL {
        bail!(
            "peer speaks protocol {:?}, expected {:?}",
            protocol,
            MSG_PROTOCOL
        );
    }
    Ok(())
}
