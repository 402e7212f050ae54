extern crate byteorder;
extern crate chrono;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
extern crate parking_lot;
extern crate serde;
extern crate serde_cbor;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate serde_json;

use std::time::Duration;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current protocol code name and magic string.
pub const MSG_PROTOCOL: &str = "nebula-v1-cbor";

/// Maximal protocol message size (64 MB).
pub const MAX_MSG_SIZE: usize = 64 * 1024 * 1024;

/// Well-known listening port of the Universe.
pub const UNIVERSE_PORT: u16 = 7410;

/// Well-known listening port of a Space (for Computer registrations).
pub const SPACE_PORT: u16 = 7411;

/// Fixed name of the Universe recovery file.
pub const RECOVERY_FILE: &str = "recovery.bk";

/// Cadence of the Universe checkpointer.
pub const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(10);

/// Sleep between iterations of a proxy send thread when the ready queue is
/// empty or the peer is saturated.
pub const POLL_DELAY: Duration = Duration::from_millis(5);

/// Read timeout used as the idle sentinel when polling a Computer for
/// results.
pub const RESULT_POLL_TIMEOUT: Duration = Duration::from_millis(50);

pub mod common;
pub mod computer;
pub mod errors;
pub mod server;
pub mod space;
pub mod tasks;
pub mod universe;

pub use errors::{Error, ErrorKind, Result, ResultExt};
