//! Domain types stored in the database.
//!
//! These types represent the persisted state of machines, units, users, and
//! their status records. All documents are CBOR-encoded inside the store's
//! revision envelope.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a model entity.
///
/// Entities are never deleted in place; they transition through `Dying` to
/// the terminal `Dead` marker, after which mutations fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Life {
    /// The entity is live and mutable.
    Alive = 0,
    /// The entity is being torn down.
    Dying = 1,
    /// Terminal marker; post-dead mutation attempts fail.
    Dead = 2,
}

impl Life {
    /// Convert the life value to its stored byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a stored byte back to a life value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Alive),
            1 => Some(Self::Dying),
            2 => Some(Self::Dead),
            _ => None,
        }
    }

    /// True for the terminal `Dead` marker.
    #[must_use]
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::Dead)
    }
}

impl fmt::Display for Life {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Alive => "alive",
            Self::Dying => "dying",
            Self::Dead => "dead",
        };
        f.write_str(s)
    }
}

/// Status values recorded for agents and workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not yet provisioned or started.
    Pending,
    /// A machine agent has started.
    Started,
    /// A machine agent has stopped cleanly.
    Stopped,
    /// A machine agent is unreachable.
    Down,
    /// A unit agent is idle, awaiting work.
    Idle,
    /// A unit agent is executing an operation.
    Executing,
    /// A workload is up and serving.
    Active,
    /// A workload is blocked on an external condition.
    Blocked,
    /// A workload has terminated.
    Terminated,
    /// An operation failed; `info` carries the reason.
    Error,
}

impl Status {
    /// The stable wire/storage string for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Down => "down",
            Self::Idle => "idle",
            Self::Executing => "executing",
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Terminated => "terminated",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "started" => Ok(Self::Started),
            "stopped" => Ok(Self::Stopped),
            "down" => Ok(Self::Down),
            "idle" => Ok(Self::Idle),
            "executing" => Ok(Self::Executing),
            "active" => Ok(Self::Active),
            "blocked" => Ok(Self::Blocked),
            "terminated" => Ok(Self::Terminated),
            "error" => Ok(Self::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognized status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status {0:?}")]
pub struct UnknownStatus(pub String);

/// Structured payload attached to a status record.
pub type StatusData = BTreeMap<String, serde_json::Value>;

/// A status record, keyed in the store by global key.
///
/// At most one current document exists per global key; `set` replaces it
/// atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDoc {
    /// The recorded status value.
    pub status: Status,
    /// Human-readable context, e.g. a hook failure message.
    pub info: String,
    /// Structured payload; empty for most updates.
    #[serde(default)]
    pub data: StatusData,
    /// When the record was written.
    pub updated_at: DateTime<Utc>,
}

impl StatusDoc {
    /// A fresh record with the given status and no info or data.
    #[must_use]
    pub fn initial(status: Status) -> Self {
        Self {
            status,
            info: String::new(),
            data: StatusData::new(),
            updated_at: Utc::now(),
        }
    }
}

/// A salted credential digest.
///
/// Only the salt and the blake3 digest of `salt || secret` are stored;
/// the secret itself never is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    salt: String,
    hash: String,
}

impl Credential {
    /// Digest a secret under a fresh random salt.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let salt = uuid::Uuid::new_v4().simple().to_string();
        let hash = Self::digest(&salt, secret);
        Self { salt, hash }
    }

    /// Constant-shape verification of a presented secret.
    #[must_use]
    pub fn matches(&self, secret: &str) -> bool {
        Self::digest(&self.salt, secret) == self.hash
    }

    fn digest(salt: &str, secret: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(salt.as_bytes());
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }
}

/// A machine document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineDoc {
    /// Machine id, a decimal number allocated from the machine sequence.
    pub id: String,
    /// Provisioning nonce, set once when the instance is started. Agents
    /// provisioned with a nonce must present it at login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Agent credential, if one has been set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Credential>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A unit document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitDoc {
    /// Unit name, `<application>/<number>`.
    pub name: String,
    /// Owning application name.
    pub application: String,
    /// The machine this unit is assigned to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    /// Agent credential, if one has been set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Credential>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A user document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDoc {
    /// User name.
    pub name: String,
    /// Whether the user may administer the controller (model manager).
    pub controller_admin: bool,
    /// Login credential.
    pub password: Credential,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A monotonic counter document backing id allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceDoc {
    /// The next value to hand out.
    pub counter: u64,
}
