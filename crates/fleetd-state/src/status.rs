//! Status records keyed by global key.
//!
//! A status record is `{status, info, data, updated_at}`, addressed by the
//! global key derived in [`crate::keys`]. There is at most one current
//! record per key; [`set_status`] replaces it atomically.
//!
//! This module does no kind-specific branching: when an entity kind routes
//! a status write to a different key (a unit agent's error status lands on
//! the workload key), the *caller* chooses the key and the aliveness guard.

use std::time::Duration;

use chrono::Utc;

use crate::error::{Result, StateError};
use crate::schema::Collection;
use crate::txn::{self, Op, TxnError};
use crate::types::{Status, StatusData, StatusDoc};
use crate::{to_cbor, State};

/// Retry bound for status writes; contention here is always transient.
const STATUS_ATTEMPTS: u32 = 3;
const STATUS_BACKOFF: Duration = Duration::from_millis(10);

/// Names the entity document whose aliveness a status write asserts.
#[derive(Debug, Clone)]
pub struct AliveGuard {
    /// Collection holding the entity document.
    pub collection: Collection,
    /// The entity document's id.
    pub id: String,
    /// Human description used in errors, e.g. `unit mysql/0`.
    pub subject: String,
}

/// Read the current status record at a global key.
///
/// # Errors
///
/// Returns `StateError::StatusNotFound` if no record exists.
pub fn get_status(state: &State, global_key: &str) -> Result<StatusDoc> {
    state
        .get_doc::<StatusDoc>(Collection::Statuses, global_key)?
        .map(|(_, doc)| doc)
        .ok_or_else(|| StateError::StatusNotFound(global_key.to_string()))
}

/// Atomically replace the status record at a global key.
///
/// If `guard` is given, the write additionally asserts that the named
/// entity document is still alive; a dead or removed entity surfaces as
/// `StateError::DeadOrGone` naming it. Contention is retried within the
/// module's bound and propagates verbatim once exhausted.
///
/// # Errors
///
/// `StateError::DeadOrGone` if the guard or the record itself is gone,
/// or the underlying transaction failure.
pub fn set_status(
    state: &State,
    global_key: &str,
    status: Status,
    info: &str,
    data: StatusData,
    guard: Option<&AliveGuard>,
) -> Result<()> {
    let doc = StatusDoc {
        status,
        info: info.to_string(),
        data,
        updated_at: Utc::now(),
    };
    let body = to_cbor(&doc)?;

    let result = txn::run_with_retry(state, STATUS_ATTEMPTS, STATUS_BACKOFF, |_| {
        let mut ops = Vec::with_capacity(2);
        if let Some(g) = guard {
            ops.push(Op::assert_alive(g.collection, &g.id));
        }
        ops.push(Op::update(Collection::Statuses, global_key, body.clone()));
        Ok(ops)
    });

    match result {
        Err(StateError::Txn(TxnError::Aborted)) => Err(StateError::DeadOrGone(
            guard.map_or_else(|| format!("status {global_key}"), |g| g.subject.clone()),
        )),
        other => other,
    }
}

/// Op inserting the initial status record for a newly created entity.
pub(crate) fn initial_status_op(global_key: &str, status: Status) -> Result<Op> {
    Ok(Op::insert(
        Collection::Statuses,
        global_key,
        crate::Life::Alive,
        to_cbor(&StatusDoc::initial(status))?,
    ))
}
