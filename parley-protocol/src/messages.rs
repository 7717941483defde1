//! Client-server message types
//!
//! One variant per wire command. Every frame serializes as a JSON object
//! with a `command` tag and a tag-specific `payload`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Frames sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", content = "payload")]
pub enum ClientFrame {
    /// Claim a display name; first and only authentication step
    #[serde(rename = "LOGIN")]
    Login(String),

    /// Direct message to a single online user
    #[serde(rename = "MSG_PRIVATE")]
    PrivateMsg { recipient: String, message: String },

    /// Create a group with the sender as first member (no-op if it exists)
    #[serde(rename = "CREATE_GROUP")]
    CreateGroup(String),

    /// Join an existing group (no-op if absent or already a member)
    #[serde(rename = "JOIN_GROUP")]
    JoinGroup(String),

    /// Message to every online member of a group
    #[serde(rename = "MSG_GROUP")]
    GroupMsg { group: String, message: String },
}

impl ClientFrame {
    /// Wire tag for this frame, for log lines
    pub fn command(&self) -> &'static str {
        match self {
            Self::Login(_) => "LOGIN",
            Self::PrivateMsg { .. } => "MSG_PRIVATE",
            Self::CreateGroup(_) => "CREATE_GROUP",
            Self::JoinGroup(_) => "JOIN_GROUP",
            Self::GroupMsg { .. } => "MSG_GROUP",
        }
    }
}

/// Frames sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", content = "payload")]
pub enum ServerFrame {
    /// Full snapshot of online user names, sorted
    #[serde(rename = "UPDATE_USER_LIST")]
    UserList(Vec<String>),

    /// Full snapshot of groups and their member lists
    #[serde(rename = "UPDATE_GROUP_LIST")]
    GroupList(BTreeMap<String, Vec<String>>),

    /// Incoming direct message
    #[serde(rename = "RECV_PRIVATE")]
    RecvPrivate { sender: String, message: String },

    /// Incoming group message
    #[serde(rename = "RECV_GROUP")]
    RecvGroup {
        sender: String,
        group: String,
        message: String,
    },

    /// User-facing failure text
    #[serde(rename = "ERROR")]
    Error(String),
}

impl ServerFrame {
    /// Build an ERROR frame
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error(msg.into())
    }
}
