use std::fmt;
use std::str::FromStr;

use errors::{Error, ErrorKind, Result};

/// Generic ID type.
pub type Id = i32;

/// ID type for registered Servers (clients).
pub type ServerId = i32;

/// ID type for registered Spaces.
pub type SpaceId = i32;

/// ID type for registered Computers.
pub type ComputerId = i32;

/// Structured task identifier.
///
/// The wire form is the colon grammar
/// `[!:]F:<clientSeq>:S<serverId>:<serverSeq>[:U<n>][:P<spaceId>:<n>][:C<n>][:W<n>]`,
/// where each optional tier marker is appended exactly once as the task
/// descends the hierarchy. The id is parsed into this record once and
/// rendered back to a string only for logging; every routing decision reads
/// a field directly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId {
    /// Leading `!`: the id names a successor (continuation).
    pub successor: bool,
    /// Task number local to the submitting client.
    pub client_seq: Id,
    /// `S` segment: the Server this task belongs to.
    pub server_id: ServerId,
    /// Submission serial assigned by the Server.
    pub server_seq: Id,
    /// `U` segment, assigned by the Server Proxy on intake.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub universe_seq: Option<Id>,
    /// `P` segment, assigned by a Space Proxy on first dispatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub space: Option<(SpaceId, Id)>,
    /// `C` segment, assigned by a Computer Proxy on first dispatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub computer: Option<ComputerId>,
    /// `W` segment, tagged by a worker thread. Informational only; never
    /// present on ids handled by the schedulers.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub worker: Option<Id>,
}

impl TaskId {
    /// Id of a freshly submitted coarse task, before any tier marker.
    pub fn root(client_seq: Id, server_id: ServerId, server_seq: Id) -> TaskId {
        TaskId {
            successor: false,
            client_seq,
            server_id,
            server_seq,
            universe_seq: None,
            space: None,
            computer: None,
            worker: None,
        }
    }

    /// Append the `U` marker. Appending is idempotent: an id that already
    /// carries the marker is left untouched and `false` is returned.
    pub fn assign_universe_seq(&mut self, seq: Id) -> bool {
        if self.universe_seq.is_none() {
            self.universe_seq = Some(seq);
            true
        } else {
            false
        }
    }

    /// Append the `P` marker (idempotent, as above).
    pub fn assign_space(&mut self, space_id: SpaceId, seq: Id) -> bool {
        if self.space.is_none() {
            self.space = Some((space_id, seq));
            true
        } else {
            false
        }
    }

    /// Append the `C` marker (idempotent, as above).
    pub fn assign_computer(&mut self, computer_id: ComputerId) -> bool {
        if self.computer.is_none() {
            self.computer = Some(computer_id);
            true
        } else {
            false
        }
    }

    /// Remove the `C` (and `W`) markers, restoring the pre-assignment form a
    /// Space expects when a result travels upward.
    pub fn strip_computer(&mut self) {
        self.computer = None;
        self.worker = None;
    }

    /// Id of the continuation spawned by decomposing this task: the same id
    /// with the successor flag set and the Computer assignment dropped.
    pub fn continuation(&self) -> TaskId {
        TaskId {
            successor: true,
            computer: None,
            worker: None,
            ..self.clone()
        }
    }

    /// Base id for the children spawned by decomposing this task: truncated
    /// before the `P` marker so that the next dispatch assigns each child a
    /// fresh Space serial (which is what makes sibling ids unique).
    pub fn child_base(&self) -> TaskId {
        TaskId {
            successor: false,
            space: None,
            computer: None,
            worker: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.successor {
            write!(f, "!:")?;
        }
        write!(
            f,
            "F:{}:S{}:{}",
            self.client_seq, self.server_id, self.server_seq
        )?;
        if let Some(seq) = self.universe_seq {
            write!(f, ":U{}", seq)?;
        }
        if let Some((space_id, seq)) = self.space {
            write!(f, ":P{}:{}", space_id, seq)?;
        }
        if let Some(computer_id) = self.computer {
            write!(f, ":C{}", computer_id)?;
        }
        if let Some(worker) = self.worker {
            write!(f, ":W{}", worker)?;
        }
        Ok(())
    }
}

fn parse_int(token: &str, id: &str) -> Result<Id> {
    token
        .parse()
        .map_err(|_| Error::from(ErrorKind::InvalidTaskId(id.into())))
}

fn parse_tagged(token: &str, tag: char, id: &str) -> Result<Id> {
    if token.len() < 2 || !token.starts_with(tag) {
        bail!(ErrorKind::InvalidTaskId(id.into()));
    }
    parse_int(&token[1..], id)
}

impl FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<TaskId> {
        let mut tokens = s.split(':').peekable();
        let successor = if tokens.peek() == Some(&"!") {
            tokens.next();
            true
        } else {
            false
        };
        if tokens.next() != Some("F") {
            bail!(ErrorKind::InvalidTaskId(s.into()));
        }
        let missing = || Error::from(ErrorKind::InvalidTaskId(s.into()));
        let client_seq = parse_int(tokens.next().ok_or_else(&missing)?, s)?;
        let server_id = parse_tagged(tokens.next().ok_or_else(&missing)?, 'S', s)?;
        let server_seq = parse_int(tokens.next().ok_or_else(&missing)?, s)?;

        let mut id = TaskId {
            successor,
            client_seq,
            server_id,
            server_seq,
            universe_seq: None,
            space: None,
            computer: None,
            worker: None,
        };
        if let Some(token) = tokens.peek().cloned() {
            if token.starts_with('U') {
                tokens.next();
                id.universe_seq = Some(parse_int(&token[1..], s)?);
            }
        }
        if let Some(token) = tokens.peek().cloned() {
            if token.starts_with('P') {
                tokens.next();
                let space_id = parse_int(&token[1..], s)?;
                let seq = parse_int(tokens.next().ok_or_else(&missing)?, s)?;
                id.space = Some((space_id, seq));
            }
        }
        if let Some(token) = tokens.peek().cloned() {
            if token.starts_with('C') {
                tokens.next();
                id.computer = Some(parse_int(&token[1..], s)?);
            }
        }
        if let Some(token) = tokens.peek().cloned() {
            if token.starts_with('W') {
                tokens.next();
                id.worker = Some(parse_int(&token[1..], s)?);
            }
        }
        if tokens.next().is_some() {
            bail!(ErrorKind::InvalidTaskId(s.into()));
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_root() {
        let id = TaskId::root(1, 0, 1);
        assert_eq!(id.to_string(), "F:1:S0:1");
    }

    #[test]
    fn render_full_descent() {
        let mut id = TaskId::root(1, 0, 1);
        assert!(id.assign_universe_seq(1));
        assert!(id.assign_space(0, 5));
        assert!(id.assign_computer(1));
        assert_eq!(id.to_string(), "F:1:S0:1:U1:P0:5:C1");
        assert_eq!(id.continuation().to_string(), "!:F:1:S0:1:U1:P0:5");
    }

    #[test]
    fn assignment_is_idempotent() {
        let mut id = TaskId::root(2, 3, 7);
        assert!(id.assign_universe_seq(4));
        assert!(!id.assign_universe_seq(9));
        assert!(id.assign_space(1, 1));
        assert!(!id.assign_space(2, 2));
        assert!(id.assign_computer(0));
        assert!(!id.assign_computer(5));
        assert_eq!(id.to_string(), "F:2:S3:7:U4:P1:1:C0");
    }

    #[test]
    fn parse_round_trip() {
        for s in &[
            "F:1:S0:1",
            "F:1:S0:1:U1",
            "F:1:S0:1:U1:P0:5",
            "!:F:1:S0:1:U1:P0:5",
            "F:1:S0:2:U2:P0:2:C1:W177",
        ] {
            let id: TaskId = s.parse().unwrap();
            assert_eq!(&id.to_string(), s);
        }
    }

    #[test]
    fn parse_extracts_routing_keys() {
        let id: TaskId = "!:F:1:S3:1:U1:P2:5:C4".parse().unwrap();
        assert!(id.successor);
        assert_eq!(id.server_id, 3);
        assert_eq!(id.space, Some((2, 5)));
        assert_eq!(id.computer, Some(4));
    }

    #[test]
    fn parse_rejects_garbage() {
        for s in &["", "G:1:S0:1", "F:x:S0:1", "F:1:S0", "F:1:S0:1:U1:extra"] {
            assert!(s.parse::<TaskId>().is_err(), "accepted {:?}", s);
        }
    }

    #[test]
    fn child_base_truncates_before_space_marker() {
        let id: TaskId = "F:1:S0:1:U1:P0:5:C1".parse().unwrap();
        assert_eq!(id.child_base().to_string(), "F:1:S0:1:U1");
    }

    #[test]
    fn strip_computer_restores_pre_assignment_form() {
        let mut id: TaskId = "F:1:S0:1:U1:P0:5:C1:W2".parse().unwrap();
        id.strip_computer();
        assert_eq!(id.to_string(), "F:1:S0:1:U1:P0:5");
    }
}
