//! A Space: intermediate scheduler between the Universe and a pool of
//! Computers. Registers with the Universe over one connection (task intake
//! down, results up) and accepts Computer registrations on its own
//! listener.

pub(crate) mod computer_proxy;
pub mod state;

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use common::comm::{RegisterComputerMsg, RegisterSpaceMsg, RegisteredMsg, ResultMsg,
                   SpaceToComputerMessage, SpaceToUniverseMessage, UniverseRegistration,
                   UniverseToSpaceMessage};
use common::framing::SocketExt;
use errors::Result;
use tasks::TaskRegistry;
use MSG_PROTOCOL;

pub use self::state::{SpaceRef, SpaceState};

/// How long a replaced uplink writer may lag before it notices.
const WRITER_POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Pause between reconnection attempts to the Universe.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Start a Space: bind the Computer listener, then keep a registration with
/// the Universe alive, reconnecting whenever the link drops. Returns the
/// space handle and the bound Computer listener address.
pub fn start(
    universe_addr: SocketAddr,
    listen: SocketAddr,
    registry: TaskRegistry,
) -> Result<(SpaceRef, SocketAddr)> {
    let space = SpaceRef::new(registry);
    let listener = TcpListener::bind(listen)?;
    let addr = listener.local_addr()?;
    info!("Space listening for computers on {}", addr);

    let accept_space = space.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let space = accept_space.clone();
                    thread::spawn(move || {
                        if let Err(e) = register_computer(space, stream) {
                            warn!("computer registration failed: {}", e);
                        }
                    });
                }
                Err(e) => warn!("accepting a connection failed: {}", e),
            }
        }
    });

    let uplink_space = space.clone();
    thread::spawn(move || loop {
        match run_uplink(&uplink_space, universe_addr) {
            Ok(()) => return,
            Err(e) => warn!("Universe link lost: {}", e),
        }
        thread::sleep(RECONNECT_DELAY);
        info!("Reconnecting to universe at {}", universe_addr);
    });

    Ok((space, addr))
}

/// One lifetime of the Universe link: register, then read `addTask` frames
/// on this thread while a writer thread streams results up.
fn run_uplink(space: &SpaceRef, universe_addr: SocketAddr) -> Result<()> {
    let mut stream = TcpStream::connect(universe_addr)?;
    stream.set_nodelay(true)?;
    stream.write_msg(&UniverseRegistration::Space(RegisterSpaceMsg {
        protocol: MSG_PROTOCOL.into(),
    }))?;
    let id = match stream.read_msg()? {
        UniverseToSpaceMessage::Registered(RegisteredMsg { id }) => id,
        _ => bail!("unexpected reply to space registration"),
    };
    space.set_id(id);
    info!("Space {} registered with the universe.", id);

    let epoch = space.link_epoch.fetch_add(1, Ordering::SeqCst) + 1;
    let writer_space = space.clone();
    let writer = stream.try_clone()?;
    thread::spawn(move || result_writer(&writer_space, writer, epoch));

    loop {
        match stream.read_msg::<UniverseToSpaceMessage>()? {
            UniverseToSpaceMessage::AddTask(m) => space.intake(m.task),
            UniverseToSpaceMessage::Registered(..) => {}
        }
    }
}

/// Stream the Space's result queue to the Universe. Exits when a newer link
/// supersedes this one or the write fails; an undelivered result goes back
/// to the front of the queue for the replacement writer.
fn result_writer(space: &SpaceRef, mut stream: TcpStream, epoch: i32) {
    loop {
        if space.link_epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        let result = match space.results.take_timeout(WRITER_POLL_TIMEOUT) {
            Some(result) => result,
            None => continue,
        };
        let msg = SpaceToUniverseMessage::Result(ResultMsg { result });
        if let Err(e) = stream.write_msg(&msg) {
            debug!("result delivery to the universe failed: {}", e);
            if let SpaceToUniverseMessage::Result(m) = msg {
                space.results.push_front(m.result);
            }
            return;
        }
    }
}

fn register_computer(space: SpaceRef, mut stream: TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;
    let msg: RegisterComputerMsg = stream.read_msg()?;
    if msg.protocol != MSG_PROTOCOL {
        bail!(
            "computer speaks protocol {:?}, expected {:?}",
            msg.protocol,
            MSG_PROTOCOL
        );
    }
    let id = space.make_computer_id();
    stream.write_msg(&SpaceToComputerMessage::Registered(RegisteredMsg { id }))?;
    computer_proxy::ComputerProxy::start(space, id, msg.workers as usize, stream)?;
    info!("Computer {} registered with {} workers.", id, msg.workers);
    Ok(())
}
