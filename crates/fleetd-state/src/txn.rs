//! The transaction runner.
//!
//! All mutations of the store go through [`run`]: an ordered, non-empty
//! list of [`Op`]s applied as a single `RocksDB` optimistic transaction.
//! Either every op applies or none do.
//!
//! Failure is typed. [`TxnError::Aborted`] means a semantic assertion
//! failed (the target is gone, dead, or already in the requested state) and
//! is never retryable. [`TxnError::Contention`] means another writer
//! touched an asserted document between the caller's read and commit; it is
//! the only kind a caller may retry, and every retrying call site goes
//! through [`run_with_retry`] so retry bounds are uniform.
//!
//! Documents are stored inside a revision envelope:
//! `[revno: u64 BE][life: u8][CBOR body]`. The revision number increments
//! on every mutation and backs the `Revno` assertion.

use std::time::Duration;

use rocksdb::ErrorKind;
use thiserror::Error;

use crate::error::{Result, StateError};
use crate::schema::Collection;
use crate::types::Life;
use crate::State;

/// Length of the envelope header: 8-byte revision + 1-byte life.
const ENVELOPE_HEADER: usize = 9;

/// A transaction-level failure.
#[derive(Debug, Error)]
pub enum TxnError {
    /// A semantic assertion failed; the target document is missing, dead,
    /// or already in the requested state. Not retryable.
    #[error("transaction aborted: an assertion failed")]
    Aborted,

    /// An optimistic-concurrency conflict. Retryable, within bounds.
    #[error("state changing too quickly; transaction contention")]
    Contention,

    /// A transaction must contain at least one operation.
    #[error("transaction has no operations")]
    NoOps,

    /// The backing store failed.
    #[error("database error: {0}")]
    Database(String),

    /// A document envelope could not be decoded.
    #[error("corrupt document envelope in {0}")]
    Corrupt(String),
}

/// Metadata carried in every document's envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocMeta {
    /// Revision number, incremented on every mutation.
    pub revno: u64,
    /// Lifecycle marker.
    pub life: Life,
}

/// The expected state of a document, checked before its mutation applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assert {
    /// The document must exist.
    Exists,
    /// The document must not exist.
    NotExists,
    /// The document must exist at exactly this revision. A mismatch is
    /// [`TxnError::Contention`]: someone wrote since the caller read.
    Revno(u64),
    /// The document must exist and not be dead.
    Alive,
}

/// The mutation half of an [`Op`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Create the document at revision 0 with the given lifecycle.
    Insert {
        /// Initial lifecycle marker.
        life: Life,
        /// CBOR-encoded body.
        body: Vec<u8>,
    },
    /// Replace the body, preserving lifecycle and bumping the revision.
    Update(Vec<u8>),
    /// Change the lifecycle marker, preserving the body.
    SetLife(Life),
    /// Delete the document.
    Remove,
    /// Assertion only; no mutation.
    Assert,
}

/// One conditional document mutation, addressed to a collection + id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    /// Target collection.
    pub collection: Collection,
    /// Target document id.
    pub id: String,
    /// Expected document state.
    pub assert: Assert,
    /// Mutation to apply if the assertion holds.
    pub mutation: Mutation,
}

impl Op {
    /// Insert a new document; asserts it does not already exist.
    #[must_use]
    pub fn insert(collection: Collection, id: &str, life: Life, body: Vec<u8>) -> Self {
        Self {
            collection,
            id: id.to_string(),
            assert: Assert::NotExists,
            mutation: Mutation::Insert { life, body },
        }
    }

    /// Replace a document's body; asserts it exists.
    #[must_use]
    pub fn update(collection: Collection, id: &str, body: Vec<u8>) -> Self {
        Self {
            collection,
            id: id.to_string(),
            assert: Assert::Exists,
            mutation: Mutation::Update(body),
        }
    }

    /// Replace a document's body; asserts the exact revision the caller
    /// read, so concurrent writers surface as contention.
    #[must_use]
    pub fn update_revno(collection: Collection, id: &str, revno: u64, body: Vec<u8>) -> Self {
        Self {
            collection,
            id: id.to_string(),
            assert: Assert::Revno(revno),
            mutation: Mutation::Update(body),
        }
    }

    /// Change a document's lifecycle marker; asserts it exists.
    #[must_use]
    pub fn set_life(collection: Collection, id: &str, life: Life) -> Self {
        Self {
            collection,
            id: id.to_string(),
            assert: Assert::Exists,
            mutation: Mutation::SetLife(life),
        }
    }

    /// Delete a document; asserts it exists.
    #[must_use]
    pub fn remove(collection: Collection, id: &str) -> Self {
        Self {
            collection,
            id: id.to_string(),
            assert: Assert::Exists,
            mutation: Mutation::Remove,
        }
    }

    /// Assert a document is alive without mutating it.
    #[must_use]
    pub fn assert_alive(collection: Collection, id: &str) -> Self {
        Self {
            collection,
            id: id.to_string(),
            assert: Assert::Alive,
            mutation: Mutation::Assert,
        }
    }
}

pub(crate) fn encode_envelope(revno: u64, life: Life, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ENVELOPE_HEADER + body.len());
    buf.extend_from_slice(&revno.to_be_bytes());
    buf.push(life.as_u8());
    buf.extend_from_slice(body);
    buf
}

pub(crate) fn decode_envelope(bytes: &[u8]) -> Option<(DocMeta, &[u8])> {
    if bytes.len() < ENVELOPE_HEADER {
        return None;
    }
    let revno = u64::from_be_bytes(bytes[..8].try_into().ok()?);
    let life = Life::from_u8(bytes[8])?;
    Some((DocMeta { revno, life }, &bytes[ENVELOPE_HEADER..]))
}

fn map_rocks_err(e: &rocksdb::Error) -> TxnError {
    match e.kind() {
        ErrorKind::Busy | ErrorKind::TryAgain | ErrorKind::TimedOut => TxnError::Contention,
        _ => TxnError::Database(e.to_string()),
    }
}

/// Apply an ordered list of ops as one atomic transaction.
///
/// Each asserted document is read under conflict tracking, its assertion
/// checked, and its mutation staged; the commit then validates that no
/// concurrent writer touched any read document. Two transactions over
/// disjoint documents never block each other; two over the same document
/// are linearized, with the loser observing [`TxnError::Contention`].
///
/// # Errors
///
/// [`TxnError::NoOps`] for an empty list, [`TxnError::Aborted`] for a
/// failed semantic assertion, [`TxnError::Contention`] for a conflict,
/// [`TxnError::Database`] for store failures.
pub fn run(state: &State, ops: &[Op]) -> std::result::Result<(), TxnError> {
    if ops.is_empty() {
        return Err(TxnError::NoOps);
    }

    let txn = state.db().transaction();
    for op in ops {
        let cf = state.cf(op.collection)?;

        let current = txn
            .get_for_update_cf(&cf, op.id.as_bytes(), true)
            .map_err(|e| map_rocks_err(&e))?;
        let meta = match current.as_deref() {
            None => None,
            Some(bytes) => {
                let (meta, _) = decode_envelope(bytes).ok_or_else(|| {
                    TxnError::Corrupt(format!("{}/{}", op.collection.name(), op.id))
                })?;
                Some(meta)
            }
        };

        match op.assert {
            Assert::Exists => {
                if meta.is_none() {
                    return Err(TxnError::Aborted);
                }
            }
            Assert::NotExists => {
                if meta.is_some() {
                    return Err(TxnError::Aborted);
                }
            }
            Assert::Alive => {
                if !meta.is_some_and(|m| !m.life.is_dead()) {
                    return Err(TxnError::Aborted);
                }
            }
            Assert::Revno(expected) => {
                if meta.map(|m| m.revno) != Some(expected) {
                    return Err(TxnError::Contention);
                }
            }
        }

        match &op.mutation {
            Mutation::Insert { life, body } => {
                if meta.is_some() {
                    return Err(TxnError::Aborted);
                }
                txn.put_cf(&cf, op.id.as_bytes(), encode_envelope(0, *life, body))
                    .map_err(|e| map_rocks_err(&e))?;
            }
            Mutation::Update(body) => {
                let meta = meta.ok_or(TxnError::Aborted)?;
                txn.put_cf(
                    &cf,
                    op.id.as_bytes(),
                    encode_envelope(meta.revno + 1, meta.life, body),
                )
                .map_err(|e| map_rocks_err(&e))?;
            }
            Mutation::SetLife(life) => {
                let meta = meta.ok_or(TxnError::Aborted)?;
                let bytes = current.as_deref().ok_or(TxnError::Aborted)?;
                let body = &bytes[ENVELOPE_HEADER..];
                txn.put_cf(
                    &cf,
                    op.id.as_bytes(),
                    encode_envelope(meta.revno + 1, *life, body),
                )
                .map_err(|e| map_rocks_err(&e))?;
            }
            Mutation::Remove => {
                if meta.is_none() {
                    return Err(TxnError::Aborted);
                }
                txn.delete_cf(&cf, op.id.as_bytes())
                    .map_err(|e| map_rocks_err(&e))?;
            }
            Mutation::Assert => {}
        }
    }

    txn.commit().map_err(|e| map_rocks_err(&e))
}

/// Run a read-modify-write transaction with bounded retry.
///
/// `build` is invoked with the attempt number (from 0) and must recompute
/// its ops from fresh reads each time. Only [`TxnError::Contention`] is
/// retried; any other failure, including [`TxnError::Aborted`], surfaces
/// immediately. When the attempt ceiling is exhausted the surfaced error is
/// the contention itself.
///
/// # Errors
///
/// Whatever `build` or the final [`run`] attempt fails with.
pub fn run_with_retry<F>(
    state: &State,
    max_attempts: u32,
    backoff: Duration,
    mut build: F,
) -> Result<()>
where
    F: FnMut(u32) -> Result<Vec<Op>>,
{
    let max_attempts = max_attempts.max(1);
    for attempt in 0..max_attempts {
        let ops = build(attempt)?;
        match run(state, &ops) {
            Ok(()) => return Ok(()),
            Err(TxnError::Contention) => {
                tracing::debug!(attempt, "transaction contention, retrying");
                if attempt + 1 < max_attempts && !backoff.is_zero() {
                    std::thread::sleep(backoff * (attempt + 1));
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(StateError::Txn(TxnError::Contention))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Collection;
    use tempfile::TempDir;

    fn create_test_state() -> (State, TempDir) {
        let dir = TempDir::new().unwrap();
        let state = State::open(dir.path()).unwrap();
        (state, dir)
    }

    fn insert_doc(state: &State, id: &str, body: &[u8]) {
        run(
            state,
            &[Op::insert(
                Collection::Statuses,
                id,
                Life::Alive,
                body.to_vec(),
            )],
        )
        .unwrap();
    }

    fn read(state: &State, id: &str) -> Option<(DocMeta, Vec<u8>)> {
        state.get_raw(Collection::Statuses, id).unwrap()
    }

    #[test]
    fn envelope_round_trip() {
        let encoded = encode_envelope(42, Life::Dying, b"payload");
        let (meta, body) = decode_envelope(&encoded).unwrap();
        assert_eq!(meta.revno, 42);
        assert_eq!(meta.life, Life::Dying);
        assert_eq!(body, b"payload");

        assert!(decode_envelope(b"short").is_none());
    }

    #[test]
    fn insert_update_remove() {
        let (state, _dir) = create_test_state();

        insert_doc(&state, "doc", b"one");
        let (meta, body) = read(&state, "doc").unwrap();
        assert_eq!(meta.revno, 0);
        assert_eq!(meta.life, Life::Alive);
        assert_eq!(body, b"one");

        run(
            &state,
            &[Op::update(Collection::Statuses, "doc", b"two".to_vec())],
        )
        .unwrap();
        let (meta, body) = read(&state, "doc").unwrap();
        assert_eq!(meta.revno, 1);
        assert_eq!(body, b"two");

        run(&state, &[Op::remove(Collection::Statuses, "doc")]).unwrap();
        assert!(read(&state, "doc").is_none());
    }

    #[test]
    fn empty_transaction_rejected() {
        let (state, _dir) = create_test_state();
        assert!(matches!(run(&state, &[]), Err(TxnError::NoOps)));
    }

    #[test]
    fn insert_existing_aborts() {
        let (state, _dir) = create_test_state();
        insert_doc(&state, "doc", b"one");

        let result = run(
            &state,
            &[Op::insert(
                Collection::Statuses,
                "doc",
                Life::Alive,
                b"again".to_vec(),
            )],
        );
        assert!(matches!(result, Err(TxnError::Aborted)));
    }

    #[test]
    fn update_missing_aborts() {
        let (state, _dir) = create_test_state();
        let result = run(
            &state,
            &[Op::update(Collection::Statuses, "ghost", b"x".to_vec())],
        );
        assert!(matches!(result, Err(TxnError::Aborted)));
    }

    #[test]
    fn abort_leaves_all_documents_unchanged() {
        let (state, _dir) = create_test_state();
        insert_doc(&state, "a", b"a0");
        insert_doc(&state, "b", b"b0");

        // Third op fails its assertion; the first two must not be visible.
        let result = run(
            &state,
            &[
                Op::update(Collection::Statuses, "a", b"a1".to_vec()),
                Op::update(Collection::Statuses, "b", b"b1".to_vec()),
                Op::update(Collection::Statuses, "missing", b"c1".to_vec()),
            ],
        );
        assert!(matches!(result, Err(TxnError::Aborted)));

        let (meta_a, body_a) = read(&state, "a").unwrap();
        let (meta_b, body_b) = read(&state, "b").unwrap();
        assert_eq!((meta_a.revno, body_a.as_slice()), (0, b"a0".as_slice()));
        assert_eq!((meta_b.revno, body_b.as_slice()), (0, b"b0".as_slice()));
    }

    #[test]
    fn multi_document_transaction_applies_all() {
        let (state, _dir) = create_test_state();
        insert_doc(&state, "a", b"a0");

        run(
            &state,
            &[
                Op::update(Collection::Statuses, "a", b"a1".to_vec()),
                Op::insert(Collection::Statuses, "b", Life::Alive, b"b0".to_vec()),
            ],
        )
        .unwrap();

        assert_eq!(read(&state, "a").unwrap().1, b"a1");
        assert_eq!(read(&state, "b").unwrap().1, b"b0");
    }

    #[test]
    fn revno_mismatch_is_contention() {
        let (state, _dir) = create_test_state();
        insert_doc(&state, "doc", b"one");
        run(
            &state,
            &[Op::update(Collection::Statuses, "doc", b"two".to_vec())],
        )
        .unwrap();

        // A writer that read revno 0 is now stale.
        let result = run(
            &state,
            &[Op::update_revno(
                Collection::Statuses,
                "doc",
                0,
                b"stale".to_vec(),
            )],
        );
        assert!(matches!(result, Err(TxnError::Contention)));
        assert_eq!(read(&state, "doc").unwrap().1, b"two");
    }

    #[test]
    fn alive_assertion_on_dead_document_aborts() {
        let (state, _dir) = create_test_state();
        insert_doc(&state, "doc", b"body");
        run(
            &state,
            &[Op::set_life(Collection::Statuses, "doc", Life::Dead)],
        )
        .unwrap();

        let result = run(&state, &[Op::assert_alive(Collection::Statuses, "doc")]);
        assert!(matches!(result, Err(TxnError::Aborted)));
    }

    #[test]
    fn set_life_preserves_body() {
        let (state, _dir) = create_test_state();
        insert_doc(&state, "doc", b"body");
        run(
            &state,
            &[Op::set_life(Collection::Statuses, "doc", Life::Dying)],
        )
        .unwrap();

        let (meta, body) = read(&state, "doc").unwrap();
        assert_eq!(meta.life, Life::Dying);
        assert_eq!(meta.revno, 1);
        assert_eq!(body, b"body");
    }

    #[test]
    fn concurrent_conflict_has_exactly_one_winner() {
        let (state, _dir) = create_test_state();
        insert_doc(&state, "doc", b"idle");

        let make_txn = |value: &'static [u8]| {
            let state = state.clone();
            std::thread::spawn(move || {
                run(
                    &state,
                    &[Op::update_revno(
                        Collection::Statuses,
                        "doc",
                        0,
                        value.to_vec(),
                    )],
                )
            })
        };

        let a = make_txn(b"executing");
        let b = make_txn(b"blocked");
        let results = [a.join().unwrap(), b.join().unwrap()];

        let wins = results.iter().filter(|r| r.is_ok()).count();
        let contentions = results
            .iter()
            .filter(|r| matches!(r, Err(TxnError::Contention)))
            .count();
        assert_eq!(wins, 1, "exactly one transaction must win: {results:?}");
        assert_eq!(contentions, 1, "the loser must observe contention");

        let (meta, body) = read(&state, "doc").unwrap();
        assert_eq!(meta.revno, 1);
        assert!(body == b"executing" || body == b"blocked");
    }

    #[test]
    fn retry_rebuilds_and_succeeds() {
        let (state, _dir) = create_test_state();
        insert_doc(&state, "doc", b"v0");

        let mut attempts = 0;
        run_with_retry(&state, 3, Duration::ZERO, |_| {
            attempts += 1;
            // First attempt uses a stale revision; the rebuild reads fresh.
            let revno = if attempts == 1 {
                99
            } else {
                state.get_raw(Collection::Statuses, "doc").unwrap().unwrap().0.revno
            };
            Ok(vec![Op::update_revno(
                Collection::Statuses,
                "doc",
                revno,
                b"v1".to_vec(),
            )])
        })
        .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(read(&state, "doc").unwrap().1, b"v1");
    }

    #[test]
    fn retry_exhaustion_surfaces_contention() {
        let (state, _dir) = create_test_state();
        insert_doc(&state, "doc", b"v0");

        let mut attempts = 0;
        let result = run_with_retry(&state, 3, Duration::ZERO, |_| {
            attempts += 1;
            Ok(vec![Op::update_revno(
                Collection::Statuses,
                "doc",
                99,
                b"never".to_vec(),
            )])
        });

        assert_eq!(attempts, 3);
        assert!(result.unwrap_err().is_contention());
        assert_eq!(read(&state, "doc").unwrap().1, b"v0");
    }

    #[test]
    fn retry_does_not_mask_abort() {
        let (state, _dir) = create_test_state();

        let mut attempts = 0;
        let result = run_with_retry(&state, 5, Duration::ZERO, |_| {
            attempts += 1;
            Ok(vec![Op::update(
                Collection::Statuses,
                "missing",
                b"x".to_vec(),
            )])
        });

        assert_eq!(attempts, 1, "aborted transactions must not be retried");
        assert!(matches!(
            result,
            Err(StateError::Txn(TxnError::Aborted))
        ));
    }
}
