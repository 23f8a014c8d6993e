//! Unit and unit-agent entity views.
//!
//! A unit carries two status records under distinct global keys: the
//! workload's (`w#<name>`) and the agent's (`u#<name>`).

use std::fmt;
use std::time::Duration;

use fleetd_core::Tag;

use crate::error::{Result, StateError};
use crate::keys;
use crate::machine::Machine;
use crate::schema::Collection;
use crate::status::{self, AliveGuard};
use crate::txn::{self, DocMeta, Op, TxnError};
use crate::types::{Credential, Life, Status, StatusData, StatusDoc, UnitDoc};
use crate::{to_cbor, State};

const WRITE_ATTEMPTS: u32 = 3;
const WRITE_BACKOFF: Duration = Duration::from_millis(10);

/// A workload unit.
#[derive(Clone)]
pub struct Unit {
    st: State,
    doc: UnitDoc,
    meta: DocMeta,
}

impl Unit {
    pub(crate) fn new(st: State, doc: UnitDoc, meta: DocMeta) -> Self {
        Self { st, doc, meta }
    }

    /// The unit name, `<application>/<number>`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.doc.name
    }

    /// The owning application's name.
    #[must_use]
    pub fn application(&self) -> &str {
        &self.doc.application
    }

    /// The unit's tag.
    #[must_use]
    pub fn tag(&self) -> Tag {
        Tag::Unit(self.doc.name.clone())
    }

    /// The unit's lifecycle as of the last read.
    #[must_use]
    pub fn life(&self) -> Life {
        self.meta.life
    }

    /// The machine this unit is assigned to, if any.
    #[must_use]
    pub fn assigned_machine(&self) -> Option<&str> {
        self.doc.machine_id.as_deref()
    }

    /// Global key for the unit's workload status record.
    #[must_use]
    pub fn global_key(&self) -> String {
        keys::unit_global_key(&self.doc.name)
    }

    /// The agent view over this unit.
    #[must_use]
    pub fn agent(&self) -> UnitAgent {
        UnitAgent {
            st: self.st.clone(),
            name: self.doc.name.clone(),
        }
    }

    /// Re-read the unit document from the store.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the unit has been removed.
    pub fn refresh(&mut self) -> Result<()> {
        let (meta, doc) = self
            .st
            .get_doc::<UnitDoc>(Collection::Units, &self.doc.name)?
            .ok_or_else(|| StateError::NotFound(format!("unit {}", self.doc.name)))?;
        self.doc = doc;
        self.meta = meta;
        Ok(())
    }

    /// Read the workload's status.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing or the store fails.
    pub fn status(&self) -> Result<StatusDoc> {
        status::get_status(&self.st, &self.global_key())
    }

    /// Set the workload's status.
    ///
    /// # Errors
    ///
    /// Fails with a dead-or-gone condition if the unit is dead.
    pub fn set_status(&self, status: Status, info: &str, data: StatusData) -> Result<()> {
        let guard = self.alive_guard();
        status::set_status(&self.st, &self.global_key(), status, info, data, Some(&guard))
            .map_err(|e| e.annotate(format!("set status of unit \"{}\"", self.doc.name)))
    }

    /// Check a presented agent secret against the stored credential.
    #[must_use]
    pub fn password_valid(&self, secret: &str) -> bool {
        self.doc
            .password
            .as_ref()
            .is_some_and(|c| c.matches(secret))
    }

    /// Set the unit agent's credential.
    ///
    /// # Errors
    ///
    /// Fails if the unit is dead or gone.
    pub fn set_password(&mut self, secret: &str) -> Result<()> {
        let credential = Credential::new(secret);
        let name = self.doc.name.clone();
        let st = self.st.clone();
        txn::run_with_retry(&st, WRITE_ATTEMPTS, WRITE_BACKOFF, |_| {
            let (meta, mut doc) = st
                .get_doc::<UnitDoc>(Collection::Units, &name)?
                .ok_or_else(|| StateError::NotFound(format!("unit {name}")))?;
            if meta.life.is_dead() {
                return Err(StateError::DeadOrGone(format!("unit {name}")));
            }
            doc.password = Some(credential.clone());
            Ok(vec![Op::update_revno(
                Collection::Units,
                &name,
                meta.revno,
                to_cbor(&doc)?,
            )])
        })
        .map_err(|e| e.annotate(format!("set password of unit \"{name}\"")))?;
        self.refresh()
    }

    /// Assign this unit to a machine.
    ///
    /// The transaction asserts both the unit and the machine are alive, so
    /// the assignment can never land on a dead machine.
    ///
    /// # Errors
    ///
    /// `StateError::AlreadyExists` if the unit is already assigned, a
    /// dead-or-gone condition if either side is dead, or contention if the
    /// model is changing too quickly.
    pub fn assign_to_machine(&mut self, machine: &Machine) -> Result<()> {
        let name = self.doc.name.clone();
        let machine_id = machine.id().to_string();
        let st = self.st.clone();
        let result = txn::run_with_retry(&st, WRITE_ATTEMPTS, WRITE_BACKOFF, |_| {
            let (meta, mut doc) = st
                .get_doc::<UnitDoc>(Collection::Units, &name)?
                .ok_or_else(|| StateError::NotFound(format!("unit {name}")))?;
            if meta.life.is_dead() {
                return Err(StateError::DeadOrGone(format!("unit {name}")));
            }
            if let Some(existing) = &doc.machine_id {
                return Err(StateError::AlreadyExists(format!(
                    "assignment of unit {name} to machine {existing}"
                )));
            }
            doc.machine_id = Some(machine_id.clone());
            Ok(vec![
                Op::assert_alive(Collection::Machines, &machine_id),
                Op::update_revno(Collection::Units, &name, meta.revno, to_cbor(&doc)?),
            ])
        });
        match result {
            Ok(()) => {
                tracing::info!(unit = %name, machine = %machine_id, "assigned unit");
                self.refresh()
            }
            Err(StateError::Txn(TxnError::Aborted)) => Err(StateError::DeadOrGone(format!(
                "machine {machine_id}"
            ))
            .annotate(format!("assign unit \"{name}\" to machine \"{machine_id}\""))),
            Err(e) => Err(e.annotate(format!(
                "assign unit \"{name}\" to machine \"{machine_id}\""
            ))),
        }
    }

    /// Transition the unit to the terminal dead marker. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the unit document is gone.
    pub fn ensure_dead(&mut self) -> Result<()> {
        let ops = [Op::set_life(Collection::Units, &self.doc.name, Life::Dead)];
        match txn::run(&self.st, &ops) {
            Ok(()) => {
                tracing::info!(unit = %self.doc.name, "unit is dead");
                self.refresh()
            }
            Err(TxnError::Aborted) => Err(StateError::NotFound(format!("unit {}", self.doc.name))),
            Err(e) => Err(e.into()),
        }
    }

    fn alive_guard(&self) -> AliveGuard {
        AliveGuard {
            collection: Collection::Units,
            id: self.doc.name.clone(),
            subject: format!("unit {}", self.doc.name),
        }
    }
}

/// The agent of a unit.
///
/// A lightweight view binding the unit's identity to the agent's global
/// key; it holds no document snapshot.
#[derive(Clone)]
pub struct UnitAgent {
    st: State,
    name: String,
}

impl UnitAgent {
    /// The unit's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The agent's tag (a unit agent shares its unit's tag).
    #[must_use]
    pub fn tag(&self) -> Tag {
        Tag::Unit(self.name.clone())
    }

    /// Global key for the agent's status record.
    #[must_use]
    pub fn global_key(&self) -> String {
        keys::unit_agent_global_key(&self.name)
    }

    /// Read the agent's status.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing or the store fails.
    pub fn status(&self) -> Result<StatusDoc> {
        status::get_status(&self.st, &self.global_key())
    }

    /// Set the agent's status.
    ///
    /// An `Error` status is recorded against the unit's workload key so
    /// operators see the failure where they look for workload health; all
    /// other statuses land on the agent's own key. The routing decision is
    /// made here, never by the status store.
    ///
    /// # Errors
    ///
    /// Fails with a dead-or-gone condition if the unit is dead.
    pub fn set_status(&self, status: Status, info: &str, data: StatusData) -> Result<()> {
        let key = if status == Status::Error {
            keys::unit_global_key(&self.name)
        } else {
            keys::unit_agent_global_key(&self.name)
        };
        let guard = AliveGuard {
            collection: Collection::Units,
            id: self.name.clone(),
            subject: format!("unit {}", self.name),
        };
        status::set_status(&self.st, &key, status, info, data, Some(&guard))
            .map_err(|e| e.annotate(format!("set status of unit agent \"{self}\"")))
    }
}

impl fmt::Display for UnitAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
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
    fn workload_status_round_trip() {
        let (state, _dir) = create_test_state();
        let unit = state.add_unit("mysql").unwrap();

        unit.set_status(Status::Active, "serving", StatusData::new())
            .unwrap();
        let doc = unit.status().unwrap();
        assert_eq!(doc.status, Status::Active);
        assert_eq!(doc.info, "serving");
    }

    #[test]
    fn agent_status_written_to_agent_key() {
        let (state, _dir) = create_test_state();
        let unit = state.add_unit("mysql").unwrap();
        let agent = unit.agent();

        agent
            .set_status(Status::Idle, "", StatusData::new())
            .unwrap();

        assert_eq!(agent.status().unwrap().status, Status::Idle);
        // The workload record is untouched.
        assert_eq!(unit.status().unwrap().status, Status::Pending);
    }

    #[test]
    fn agent_error_status_redirects_to_workload_key() {
        let (state, _dir) = create_test_state();
        let unit = state.add_unit("mysql").unwrap();
        let agent = unit.agent();

        agent
            .set_status(Status::Error, "hook failed", StatusData::new())
            .unwrap();

        let workload = unit.status().unwrap();
        assert_eq!(workload.status, Status::Error);
        assert_eq!(workload.info, "hook failed");
        // The agent's own record is untouched.
        assert_eq!(agent.status().unwrap().status, Status::Pending);
    }

    #[test]
    fn agent_status_on_dead_unit_fails() {
        let (state, _dir) = create_test_state();
        let mut unit = state.add_unit("mysql").unwrap();
        let agent = unit.agent();
        unit.ensure_dead().unwrap();

        let err = agent
            .set_status(Status::Idle, "", StatusData::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot set status of unit agent \"mysql/0\": unit mysql/0 not found or dead"
        );
    }

    #[test]
    fn password_lifecycle() {
        let (state, _dir) = create_test_state();
        let mut unit = state.add_unit("mysql").unwrap();

        unit.set_password("secret").unwrap();
        assert!(unit.password_valid("secret"));
        assert!(!unit.password_valid("wrong"));
    }

    #[test]
    fn assign_to_machine() {
        let (state, _dir) = create_test_state();
        let machine = state.add_machine().unwrap();
        let mut unit = state.add_unit("mysql").unwrap();

        unit.assign_to_machine(&machine).unwrap();
        assert_eq!(unit.assigned_machine(), Some("0"));

        // Second assignment is rejected.
        let err = unit.assign_to_machine(&machine).unwrap_err();
        assert!(matches!(
            err,
            StateError::Failed { .. } | StateError::AlreadyExists(_)
        ));
    }

    #[test]
    fn assign_to_dead_machine_fails() {
        let (state, _dir) = create_test_state();
        let mut machine = state.add_machine().unwrap();
        machine.ensure_dead().unwrap();
        let mut unit = state.add_unit("mysql").unwrap();

        let err = unit.assign_to_machine(&machine).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(unit.assigned_machine(), None);
    }

    #[test]
    fn agent_tag_matches_unit_tag() {
        let (state, _dir) = create_test_state();
        let unit = state.add_unit("mysql").unwrap();
        assert_eq!(unit.agent().tag(), unit.tag());
        assert_eq!(unit.agent().tag().to_string(), "unit-mysql-0");
    }
}
