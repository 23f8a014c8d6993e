//! Machine entity view.

use std::time::Duration;

use fleetd_core::Tag;

use crate::error::{Result, StateError};
use crate::keys;
use crate::schema::Collection;
use crate::status::{self, AliveGuard};
use crate::txn::{self, DocMeta, Op, TxnError};
use crate::types::{Credential, Life, MachineDoc, Status, StatusData, StatusDoc};
use crate::{to_cbor, State};

const WRITE_ATTEMPTS: u32 = 3;
const WRITE_BACKOFF: Duration = Duration::from_millis(10);

/// A provisioned machine and its agent.
///
/// Holds a snapshot of the machine document; [`Machine::refresh`] re-reads
/// it. State changes go through transactions on the shared store.
#[derive(Clone)]
pub struct Machine {
    st: State,
    doc: MachineDoc,
    meta: DocMeta,
}

impl Machine {
    pub(crate) fn new(st: State, doc: MachineDoc, meta: DocMeta) -> Self {
        Self { st, doc, meta }
    }

    /// The machine id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.doc.id
    }

    /// The machine's tag.
    #[must_use]
    pub fn tag(&self) -> Tag {
        Tag::Machine(self.doc.id.clone())
    }

    /// The machine's lifecycle as of the last read.
    #[must_use]
    pub fn life(&self) -> Life {
        self.meta.life
    }

    /// Global key for the machine agent's status record.
    #[must_use]
    pub fn global_key(&self) -> String {
        keys::machine_global_key(&self.doc.id)
    }

    /// Re-read the machine document from the store.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the machine has been removed.
    pub fn refresh(&mut self) -> Result<()> {
        let (meta, doc) = self
            .st
            .get_doc::<MachineDoc>(Collection::Machines, &self.doc.id)?
            .ok_or_else(|| StateError::NotFound(format!("machine {}", self.doc.id)))?;
        self.doc = doc;
        self.meta = meta;
        Ok(())
    }

    /// Read the machine agent's status.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing or the store fails.
    pub fn status(&self) -> Result<StatusDoc> {
        status::get_status(&self.st, &self.global_key())
    }

    /// Set the machine agent's status.
    ///
    /// # Errors
    ///
    /// Fails with a dead-or-gone condition if the machine is dead.
    pub fn set_status(&self, status: Status, info: &str, data: StatusData) -> Result<()> {
        let guard = AliveGuard {
            collection: Collection::Machines,
            id: self.doc.id.clone(),
            subject: format!("machine {}", self.doc.id),
        };
        status::set_status(&self.st, &self.global_key(), status, info, data, Some(&guard))
            .map_err(|e| e.annotate(format!("set status of machine \"{}\"", self.doc.id)))
    }

    /// Check a presented agent secret against the stored credential.
    #[must_use]
    pub fn password_valid(&self, secret: &str) -> bool {
        self.doc
            .password
            .as_ref()
            .is_some_and(|c| c.matches(secret))
    }

    /// Set the machine agent's credential.
    ///
    /// # Errors
    ///
    /// Fails if the machine is dead or gone.
    pub fn set_password(&mut self, secret: &str) -> Result<()> {
        let credential = Credential::new(secret);
        let id = self.doc.id.clone();
        let st = self.st.clone();
        txn::run_with_retry(&st, WRITE_ATTEMPTS, WRITE_BACKOFF, |_| {
            let (meta, mut doc) = st
                .get_doc::<MachineDoc>(Collection::Machines, &id)?
                .ok_or_else(|| StateError::NotFound(format!("machine {id}")))?;
            if meta.life.is_dead() {
                return Err(StateError::DeadOrGone(format!("machine {id}")));
            }
            doc.password = Some(credential.clone());
            Ok(vec![Op::update_revno(
                Collection::Machines,
                &id,
                meta.revno,
                to_cbor(&doc)?,
            )])
        })
        .map_err(|e| e.annotate(format!("set password of machine \"{id}\"")))?;
        self.refresh()
    }

    /// True once a provisioning nonce has been recorded.
    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        self.doc.nonce.is_some()
    }

    /// Check that a presented nonce matches the provisioning nonce.
    #[must_use]
    pub fn check_provisioned(&self, nonce: &str) -> bool {
        self.doc.nonce.as_deref() == Some(nonce)
    }

    /// Record the provisioning nonce. A machine is provisioned exactly
    /// once.
    ///
    /// # Errors
    ///
    /// Returns `StateError::AlreadyProvisioned` if a nonce is already
    /// recorded, or a dead-or-gone condition if the machine is dead.
    pub fn set_provisioned(&mut self, nonce: &str) -> Result<()> {
        let id = self.doc.id.clone();
        let st = self.st.clone();
        txn::run_with_retry(&st, WRITE_ATTEMPTS, WRITE_BACKOFF, |_| {
            let (meta, mut doc) = st
                .get_doc::<MachineDoc>(Collection::Machines, &id)?
                .ok_or_else(|| StateError::NotFound(format!("machine {id}")))?;
            if meta.life.is_dead() {
                return Err(StateError::DeadOrGone(format!("machine {id}")));
            }
            if doc.nonce.is_some() {
                return Err(StateError::AlreadyProvisioned(id.clone()));
            }
            doc.nonce = Some(nonce.to_string());
            Ok(vec![Op::update_revno(
                Collection::Machines,
                &id,
                meta.revno,
                to_cbor(&doc)?,
            )])
        })?;
        tracing::info!(machine = %id, "machine provisioned");
        self.refresh()
    }

    /// Transition the machine to the terminal dead marker.
    ///
    /// Idempotent: a machine that is already dead stays dead.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the machine document is gone.
    pub fn ensure_dead(&mut self) -> Result<()> {
        let ops = [Op::set_life(Collection::Machines, &self.doc.id, Life::Dead)];
        match txn::run(&self.st, &ops) {
            Ok(()) => {
                tracing::info!(machine = %self.doc.id, "machine is dead");
                self.refresh()
            }
            Err(TxnError::Aborted) => {
                Err(StateError::NotFound(format!("machine {}", self.doc.id)))
            }
            Err(e) => Err(e.into()),
        }
    }
}
