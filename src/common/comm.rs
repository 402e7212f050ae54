//! Wire messages exchanged between the tiers. Each direction of each tier
//! pair has its own enum; registration handshakes come first on a fresh
//! connection, after which both sides switch to the streaming enums.

use common::id::ServerId;
use common::task::{Task, TaskResult};

/// First frame on a connection to the Universe: selects the peer type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseRegistration {
    Server(RegisterServerMsg),
    Space(RegisterSpaceMsg),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterServerMsg {
    /// Protocol version magic.
    pub protocol: String,
    /// A client reconnecting after a Universe recovery may ask for its
    /// previous id back, so that recovered results still route to it.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub resume: Option<ServerId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterSpaceMsg {
    pub protocol: String,
}

/// First frame on a connection to a Space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterComputerMsg {
    pub protocol: String,
    /// Number of local worker threads; the Space dispatches at most this
    /// many tasks concurrently.
    pub workers: u32,
}

/// Reply to any registration: the id assigned by the upper tier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisteredMsg {
    pub id: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitMsg {
    pub task: Task,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddTaskMsg {
    pub task: Task,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResultMsg {
    pub result: TaskResult,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerToUniverseMessage {
    Submit(SubmitMsg),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseToServerMessage {
    Registered(RegisteredMsg),
    Result(ResultMsg),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceToUniverseMessage {
    Result(ResultMsg),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseToSpaceMessage {
    Registered(RegisteredMsg),
    AddTask(AddTaskMsg),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputerToSpaceMessage {
    Result(ResultMsg),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceToComputerMessage {
    Registered(RegisteredMsg),
    AddTask(AddTaskMsg),
}
