//! Transactional state store for fleetd.
//!
//! This crate is the single mutation choke point of the control plane. It
//! models machines, workload units, their agents, and users as CBOR
//! documents in `RocksDB`, mutated only through atomic, optimistically
//! concurrent multi-document transactions.
//!
//! # Architecture
//!
//! - [`txn`]: the transaction runner: ordered conditional ops, all-or-
//!   nothing application, typed `Contention`/`Aborted` failure, and the
//!   single bounded-retry helper.
//! - [`status`]: status records keyed by global key (`u#mysql/0`, …).
//! - [`machine`], [`unit`], [`user`]: entity views binding a tag to its
//!   global-key derivation and delegating mutations to transactions.
//!
//! A [`State`] is shared by reference: cloning is cheap and any number of
//! facades may hold one; none owns exclusive lifetime.
//!
//! # Example
//!
//! ```no_run
//! use fleetd_state::{State, Status, StatusData};
//!
//! let state = State::open("/tmp/fleetd-db").unwrap();
//! let unit = state.add_unit("mysql").unwrap();
//! let agent = unit.agent();
//! agent
//!     .set_status(Status::Idle, "", StatusData::new())
//!     .unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod machine;
pub mod schema;
pub mod status;
pub mod txn;
pub mod types;
pub mod unit;
pub mod user;

pub use error::{Result, StateError};
pub use machine::Machine;
pub use schema::Collection;
pub use txn::{Assert, DocMeta, Mutation, Op, TxnError};
pub use types::{Credential, Life, Status, StatusData, StatusDoc};
pub use unit::{Unit, UnitAgent};
pub use user::User;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use fleetd_core::Tag;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, MultiThreaded, OptimisticTransactionDB, Options,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use types::{MachineDoc, SequenceDoc, UnitDoc, UserDoc};

/// Bounded attempts for sequence allocation, which retries on both
/// assertion failure and contention (an allocation race is never semantic).
const SEQUENCE_ATTEMPTS: u32 = 16;

/// Handle to the backing document store.
///
/// Cheap to clone; all clones share the same database.
#[derive(Clone)]
pub struct State {
    db: Arc<OptimisticTransactionDB<MultiThreaded>>,
}

impl State {
    /// Open or create the store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = schema::all_collections()
            .into_iter()
            .map(|c| ColumnFamilyDescriptor::new(c.name(), Options::default()))
            .collect();

        let db = OptimisticTransactionDB::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StateError::Txn(TxnError::Database(e.to_string())))?;

        Ok(Self { db: Arc::new(db) })
    }

    pub(crate) fn db(&self) -> &OptimisticTransactionDB<MultiThreaded> {
        &self.db
    }

    pub(crate) fn cf(
        &self,
        collection: Collection,
    ) -> std::result::Result<Arc<BoundColumnFamily<'_>>, TxnError> {
        self.db.cf_handle(collection.name()).ok_or_else(|| {
            TxnError::Database(format!("column family not found: {}", collection.name()))
        })
    }

    /// Read a document's envelope metadata and raw CBOR body.
    pub(crate) fn get_raw(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<(DocMeta, Vec<u8>)>> {
        let cf = self.cf(collection)?;
        let bytes = self
            .db
            .get_cf(&cf, id.as_bytes())
            .map_err(|e| TxnError::Database(e.to_string()))?;
        match bytes {
            None => Ok(None),
            Some(bytes) => {
                let (meta, body) = txn::decode_envelope(&bytes).ok_or_else(|| {
                    TxnError::Corrupt(format!("{}/{id}", collection.name()))
                })?;
                Ok(Some((meta, body.to_vec())))
            }
        }
    }

    /// Read and decode a typed document.
    pub(crate) fn get_doc<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<(DocMeta, T)>> {
        match self.get_raw(collection, id)? {
            None => Ok(None),
            Some((meta, body)) => Ok(Some((meta, from_cbor(&body)?))),
        }
    }

    // =========================================================================
    // Entity accessors
    // =========================================================================

    /// Look up a machine by id.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if no such machine exists.
    pub fn machine(&self, id: &str) -> Result<Machine> {
        let (meta, doc) = self
            .get_doc::<MachineDoc>(Collection::Machines, id)?
            .ok_or_else(|| StateError::NotFound(format!("machine {id}")))?;
        Ok(Machine::new(self.clone(), doc, meta))
    }

    /// Look up a unit by name.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if no such unit exists.
    pub fn unit(&self, name: &str) -> Result<Unit> {
        let (meta, doc) = self
            .get_doc::<UnitDoc>(Collection::Units, name)?
            .ok_or_else(|| StateError::NotFound(format!("unit {name}")))?;
        Ok(Unit::new(self.clone(), doc, meta))
    }

    /// Look up a unit's agent by unit name.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if no such unit exists.
    pub fn unit_agent(&self, name: &str) -> Result<UnitAgent> {
        Ok(self.unit(name)?.agent())
    }

    /// Look up a user by name.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if no such user exists.
    pub fn user(&self, name: &str) -> Result<User> {
        let (meta, doc) = self
            .get_doc::<UserDoc>(Collection::Users, name)?
            .ok_or_else(|| StateError::NotFound(format!("user {name}")))?;
        Ok(User::new(self.clone(), doc, meta))
    }

    // =========================================================================
    // Entity creation
    // =========================================================================

    /// Add a machine, allocating the next machine id.
    ///
    /// Inserts the machine document and its initial agent status record in
    /// one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn add_machine(&self) -> Result<Machine> {
        let id = self.next_sequence("machine")?.to_string();
        let doc = MachineDoc {
            id: id.clone(),
            nonce: None,
            password: None,
            created_at: Utc::now(),
        };

        let ops = vec![
            Op::insert(Collection::Machines, &id, Life::Alive, to_cbor(&doc)?),
            status::initial_status_op(&keys::machine_global_key(&id), Status::Pending)?,
        ];
        match txn::run(self, &ops) {
            Ok(()) => {
                tracing::info!(machine = %id, "added machine");
                self.machine(&id)
            }
            Err(TxnError::Aborted) => Err(StateError::AlreadyExists(format!("machine {id}"))),
            Err(e) => Err(e.into()),
        }
    }

    /// Add a unit of the given application, allocating the next unit number.
    ///
    /// Inserts the unit document plus its agent and workload status records
    /// in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotValid` for a malformed application name, or
    /// an error if the store fails.
    pub fn add_unit(&self, application: &str) -> Result<Unit> {
        if Tag::parse(&format!("application-{application}")).is_err() {
            return Err(StateError::NotValid(format!(
                "\"{application}\" is not a valid application name"
            )));
        }

        let number = self.next_sequence(&format!("application-{application}"))?;
        let name = format!("{application}/{number}");
        let doc = UnitDoc {
            name: name.clone(),
            application: application.to_string(),
            machine_id: None,
            password: None,
            created_at: Utc::now(),
        };

        let ops = vec![
            Op::insert(Collection::Units, &name, Life::Alive, to_cbor(&doc)?),
            status::initial_status_op(&keys::unit_agent_global_key(&name), Status::Pending)?,
            status::initial_status_op(&keys::unit_global_key(&name), Status::Pending)?,
        ];
        match txn::run(self, &ops) {
            Ok(()) => {
                tracing::info!(unit = %name, "added unit");
                self.unit(&name)
            }
            Err(TxnError::Aborted) => Err(StateError::AlreadyExists(format!("unit {name}"))),
            Err(e) => Err(e.into()),
        }
    }

    /// Add a user with the given login secret.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotValid` for a malformed user name,
    /// `StateError::AlreadyExists` if the name is taken, or an error if the
    /// store fails.
    pub fn add_user(&self, name: &str, password: &str, controller_admin: bool) -> Result<User> {
        Tag::user(name)
            .map_err(|_| StateError::NotValid(format!("\"{name}\" is not a valid user name")))?;

        let doc = UserDoc {
            name: name.to_string(),
            controller_admin,
            password: Credential::new(password),
            created_at: Utc::now(),
        };

        let ops = vec![Op::insert(
            Collection::Users,
            name,
            Life::Alive,
            to_cbor(&doc)?,
        )];
        match txn::run(self, &ops) {
            Ok(()) => {
                tracing::info!(user = %name, "added user");
                self.user(name)
            }
            Err(TxnError::Aborted) => Err(StateError::AlreadyExists(format!("user {name}"))),
            Err(e) => Err(e.into()),
        }
    }

    /// Allocate the next value of a named sequence.
    ///
    /// Both assertion failure and contention are retried here: two callers
    /// racing to create or bump the same counter is never a semantic
    /// conflict.
    fn next_sequence(&self, name: &str) -> Result<u64> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let current = self.get_doc::<SequenceDoc>(Collection::Sequences, name)?;
            let (value, op) = match current {
                None => (
                    0,
                    Op::insert(
                        Collection::Sequences,
                        name,
                        Life::Alive,
                        to_cbor(&SequenceDoc { counter: 1 })?,
                    ),
                ),
                Some((meta, doc)) => (
                    doc.counter,
                    Op::update_revno(
                        Collection::Sequences,
                        name,
                        meta.revno,
                        to_cbor(&SequenceDoc {
                            counter: doc.counter + 1,
                        })?,
                    ),
                ),
            };
            match txn::run(self, &[op]) {
                Ok(()) => return Ok(value),
                Err(TxnError::Aborted | TxnError::Contention) if attempts < SEQUENCE_ATTEMPTS => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// An entity resolved from a tag, dispatched over the finite kind set.
#[derive(Clone)]
pub enum ModelEntity {
    /// A machine and its agent.
    Machine(Machine),
    /// A workload unit and its agent.
    Unit(Unit),
    /// A human user.
    User(User),
}

impl ModelEntity {
    /// The entity's tag.
    #[must_use]
    pub fn tag(&self) -> Tag {
        match self {
            Self::Machine(m) => m.tag(),
            Self::Unit(u) => u.tag(),
            Self::User(u) => u.tag(),
        }
    }

    /// The entity's lifecycle. Users have none and are always alive.
    #[must_use]
    pub fn life(&self) -> Life {
        match self {
            Self::Machine(m) => m.life(),
            Self::Unit(u) => u.life(),
            Self::User(_) => Life::Alive,
        }
    }
}

/// Resolves tags to model entities.
///
/// Decoupled from [`State`] so authentication code can be exercised against
/// a stub finder.
pub trait EntityFinder: Send + Sync {
    /// Look up the entity named by `tag`.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` for unknown entities and for tag
    /// kinds the model does not store.
    fn find_entity(&self, tag: &Tag) -> Result<ModelEntity>;
}

impl EntityFinder for State {
    fn find_entity(&self, tag: &Tag) -> Result<ModelEntity> {
        match tag {
            Tag::Machine(id) => Ok(ModelEntity::Machine(self.machine(id)?)),
            Tag::Unit(name) => Ok(ModelEntity::Unit(self.unit(name)?)),
            Tag::User(name) => Ok(ModelEntity::User(self.user(name)?)),
            other => Err(StateError::NotFound(format!("entity {other}"))),
        }
    }
}

/// Serialize a document body using CBOR.
pub(crate) fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StateError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a document body from CBOR.
pub(crate) fn from_cbor<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| StateError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_state() -> (State, TempDir) {
        let dir = TempDir::new().unwrap();
        let state = State::open(dir.path()).unwrap();
        (state, dir)
    }

    #[test]
    fn add_machine_allocates_sequential_ids() {
        let (state, _dir) = create_test_state();
        assert_eq!(state.add_machine().unwrap().id(), "0");
        assert_eq!(state.add_machine().unwrap().id(), "1");
        assert_eq!(state.add_machine().unwrap().id(), "2");
    }

    #[test]
    fn add_unit_allocates_per_application() {
        let (state, _dir) = create_test_state();
        assert_eq!(state.add_unit("mysql").unwrap().name(), "mysql/0");
        assert_eq!(state.add_unit("mysql").unwrap().name(), "mysql/1");
        assert_eq!(state.add_unit("wordpress").unwrap().name(), "wordpress/0");
    }

    #[test]
    fn add_unit_rejects_bad_application_name() {
        let (state, _dir) = create_test_state();
        let err = state.add_unit("MySQL").unwrap_err();
        assert!(matches!(err, StateError::NotValid(_)));
    }

    #[test]
    fn add_unit_creates_both_status_records() {
        let (state, _dir) = create_test_state();
        let unit = state.add_unit("mysql").unwrap();

        let agent = status::get_status(&state, &keys::unit_agent_global_key(unit.name())).unwrap();
        let workload = status::get_status(&state, &keys::unit_global_key(unit.name())).unwrap();
        assert_eq!(agent.status, Status::Pending);
        assert_eq!(workload.status, Status::Pending);
    }

    #[test]
    fn add_user_and_duplicate() {
        let (state, _dir) = create_test_state();
        let user = state.add_user("admin", "password", true).unwrap();
        assert!(user.is_controller_admin());
        assert!(user.password_valid("password"));

        let err = state.add_user("admin", "other", false).unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));
    }

    #[test]
    fn add_user_rejects_bad_name() {
        let (state, _dir) = create_test_state();
        let err = state.add_user("0bad", "password", false).unwrap_err();
        assert!(matches!(err, StateError::NotValid(_)));
    }

    #[test]
    fn find_entity_dispatches_by_kind() {
        let (state, _dir) = create_test_state();
        let machine = state.add_machine().unwrap();
        let unit = state.add_unit("mysql").unwrap();
        state.add_user("admin", "password", false).unwrap();

        let found = state.find_entity(&machine.tag()).unwrap();
        assert_eq!(found.tag(), machine.tag());

        let found = state.find_entity(&unit.tag()).unwrap();
        assert_eq!(found.tag(), unit.tag());

        let found = state.find_entity(&Tag::user("admin").unwrap()).unwrap();
        assert_eq!(found.tag().to_string(), "user-admin");
    }

    #[test]
    fn find_entity_unknown_or_unsupported() {
        let (state, _dir) = create_test_state();

        let err = state
            .find_entity(&Tag::machine("99").unwrap())
            .unwrap_err();
        assert!(err.is_not_found());

        let relation = Tag::parse("relation-wordpress.db#mysql.server").unwrap();
        let err = state.find_entity(&relation).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn sequences_survive_concurrent_allocation() {
        let (state, _dir) = create_test_state();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || state.add_machine().unwrap().id().to_string())
            })
            .collect();

        let mut ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4, "machine ids must be unique under races");
    }
}
