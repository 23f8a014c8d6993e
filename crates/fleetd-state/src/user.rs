//! User entity view.

use std::time::Duration;

use fleetd_core::Tag;

use crate::error::{Result, StateError};
use crate::schema::Collection;
use crate::txn::{self, DocMeta, Op};
use crate::types::{Credential, UserDoc};
use crate::{to_cbor, State};

const WRITE_ATTEMPTS: u32 = 3;
const WRITE_BACKOFF: Duration = Duration::from_millis(10);

/// A human user of the controller.
///
/// Users have no lifecycle: they are never marked dead.
#[derive(Clone)]
pub struct User {
    st: State,
    doc: UserDoc,
}

impl User {
    pub(crate) fn new(st: State, doc: UserDoc, _meta: DocMeta) -> Self {
        Self { st, doc }
    }

    /// The user name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.doc.name
    }

    /// The user's tag.
    #[must_use]
    pub fn tag(&self) -> Tag {
        Tag::User(self.doc.name.clone())
    }

    /// Whether this user may administer the controller.
    #[must_use]
    pub fn is_controller_admin(&self) -> bool {
        self.doc.controller_admin
    }

    /// Check a presented login secret against the stored credential.
    #[must_use]
    pub fn password_valid(&self, secret: &str) -> bool {
        self.doc.password.matches(secret)
    }

    /// Replace the user's login credential.
    ///
    /// # Errors
    ///
    /// Fails if the user has been removed or the store fails.
    pub fn set_password(&mut self, secret: &str) -> Result<()> {
        let credential = Credential::new(secret);
        let name = self.doc.name.clone();
        let st = self.st.clone();
        txn::run_with_retry(&st, WRITE_ATTEMPTS, WRITE_BACKOFF, |_| {
            let (meta, mut doc) = st
                .get_doc::<UserDoc>(Collection::Users, &name)?
                .ok_or_else(|| StateError::NotFound(format!("user {name}")))?;
            doc.password = credential.clone();
            Ok(vec![Op::update_revno(
                Collection::Users,
                &name,
                meta.revno,
                to_cbor(&doc)?,
            )])
        })
        .map_err(|e| e.annotate(format!("set password of user \"{name}\"")))?;
        self.refresh()
    }

    /// Re-read the user document from the store.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the user has been removed.
    pub fn refresh(&mut self) -> Result<()> {
        let (_meta, doc) = self
            .st
            .get_doc::<UserDoc>(Collection::Users, &self.doc.name)?
            .ok_or_else(|| StateError::NotFound(format!("user {}", self.doc.name)))?;
        self.doc = doc;
        Ok(())
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
    fn password_round_trip() {
        let (state, _dir) = create_test_state();
        let mut user = state.add_user("admin", "password", false).unwrap();

        assert!(user.password_valid("password"));
        user.set_password("rotated").unwrap();
        assert!(user.password_valid("rotated"));
        assert!(!user.password_valid("password"));
    }

    #[test]
    fn controller_admin_flag() {
        let (state, _dir) = create_test_state();
        let admin = state.add_user("admin", "password", true).unwrap();
        let plain = state.add_user("bob", "password", false).unwrap();
        assert!(admin.is_controller_admin());
        assert!(!plain.is_controller_admin());
    }

    #[test]
    fn tag_form() {
        let (state, _dir) = create_test_state();
        let user = state.add_user("admin", "password", false).unwrap();
        assert_eq!(user.tag().to_string(), "user-admin");
    }
}
