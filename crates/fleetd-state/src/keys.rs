//! Global-key derivation.
//!
//! A global key addresses a status record in the store and has the form
//! `<kind-prefix>#<entity-name>`. The format is persisted state: any change
//! to it is a breaking migration of existing databases.
//!
//! Derivation is pure and total: a given name always yields the same key.

/// Global key for a machine agent's status: `m#<machine-id>`.
#[must_use]
pub fn machine_global_key(id: &str) -> String {
    format!("m#{id}")
}

/// Global key for a unit agent's status: `u#<unit-name>`.
#[must_use]
pub fn unit_agent_global_key(name: &str) -> String {
    format!("u#{name}")
}

/// Global key for a unit's workload status: `w#<unit-name>`.
///
/// Deliberately a distinct namespace from the unit agent's key so the two
/// status records never collide.
#[must_use]
pub fn unit_global_key(name: &str) -> String {
    format!("w#{name}")
}

/// Global key for an application's status: `a#<application-name>`.
#[must_use]
pub fn application_global_key(name: &str) -> String {
    format!("a#{name}")
}
