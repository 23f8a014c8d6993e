//! Strongly-typed entity tags.
//!
//! Every addressable entity in the model is identified by a tag: a kind
//! discriminant plus a name whose syntax is kind-specific. The string form
//! `<kind>-<id>` is stable and round-trips through parsing for every
//! supported kind.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind discriminant of a [`Tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    /// A human user of the controller.
    User,
    /// A provisioned machine and its agent.
    Machine,
    /// A workload unit and its agent.
    Unit,
    /// An application (a named collection of units).
    Application,
    /// A relation between application endpoints.
    Relation,
    /// A model hosted by the controller.
    Model,
}

impl TagKind {
    /// The string prefix used in a tag's serialized form.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Machine => "machine",
            Self::Unit => "unit",
            Self::Application => "application",
            Self::Relation => "relation",
            Self::Model => "model",
        }
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A typed, parseable identity for a model entity.
///
/// The payload is the entity's natural name, not the serialized tag body:
/// a unit tag holds `"mysql/0"` even though it prints as `unit-mysql-0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Tag {
    /// `user-<name>`.
    User(String),
    /// `machine-<id>`, where the id is a decimal number.
    Machine(String),
    /// `unit-<application>-<number>`, naming unit `<application>/<number>`.
    Unit(String),
    /// `application-<name>`.
    Application(String),
    /// `relation-<key>`, e.g. `relation-wordpress.db#mysql.server`.
    Relation(String),
    /// `model-<uuid>`.
    Model(String),
}

impl Tag {
    /// Parse a tag from its string form.
    ///
    /// # Errors
    ///
    /// Returns [`TagError::NotValid`] if the string is not a well-formed
    /// tag of any supported kind.
    pub fn parse(s: &str) -> Result<Self, TagError> {
        let not_valid = || TagError::NotValid(s.to_string());

        let (prefix, body) = s.split_once('-').ok_or_else(not_valid)?;
        if body.is_empty() {
            return Err(not_valid());
        }

        match prefix {
            "user" if is_valid_user_name(body) => Ok(Self::User(body.to_string())),
            "machine" if is_valid_machine_id(body) => Ok(Self::Machine(body.to_string())),
            "unit" => {
                let name = unit_tag_body_to_name(body).ok_or_else(not_valid)?;
                Ok(Self::Unit(name))
            }
            "application" if is_valid_application_name(body) => {
                Ok(Self::Application(body.to_string()))
            }
            "relation" if is_valid_relation_key(body) => Ok(Self::Relation(body.to_string())),
            "model" if uuid::Uuid::parse_str(body).is_ok() => Ok(Self::Model(body.to_string())),
            _ => Err(not_valid()),
        }
    }

    /// The kind discriminant of this tag.
    #[must_use]
    pub const fn kind(&self) -> TagKind {
        match self {
            Self::User(_) => TagKind::User,
            Self::Machine(_) => TagKind::Machine,
            Self::Unit(_) => TagKind::Unit,
            Self::Application(_) => TagKind::Application,
            Self::Relation(_) => TagKind::Relation,
            Self::Model(_) => TagKind::Model,
        }
    }

    /// The entity's natural name (e.g. `mysql/0` for a unit tag).
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::User(s)
            | Self::Machine(s)
            | Self::Unit(s)
            | Self::Application(s)
            | Self::Relation(s)
            | Self::Model(s) => s,
        }
    }

    /// Build a unit tag from a unit name such as `mysql/0`.
    ///
    /// # Errors
    ///
    /// Returns [`TagError::NotValid`] if the name is not a valid unit name.
    pub fn unit(name: &str) -> Result<Self, TagError> {
        if is_valid_unit_name(name) {
            Ok(Self::Unit(name.to_string()))
        } else {
            Err(TagError::NotValid(name.to_string()))
        }
    }

    /// Build a machine tag from a machine id such as `0`.
    ///
    /// # Errors
    ///
    /// Returns [`TagError::NotValid`] if the id is not a decimal number.
    pub fn machine(id: &str) -> Result<Self, TagError> {
        if is_valid_machine_id(id) {
            Ok(Self::Machine(id.to_string()))
        } else {
            Err(TagError::NotValid(id.to_string()))
        }
    }

    /// Build a user tag from a user name such as `admin`.
    ///
    /// # Errors
    ///
    /// Returns [`TagError::NotValid`] if the name is not a valid user name.
    pub fn user(name: &str) -> Result<Self, TagError> {
        if is_valid_user_name(name) {
            Ok(Self::User(name.to_string()))
        } else {
            Err(TagError::NotValid(name.to_string()))
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit(name) => write!(f, "unit-{}", name.replace('/', "-")),
            other => write!(f, "{}-{}", other.kind().prefix(), other.id()),
        }
    }
}

impl FromStr for Tag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Tag {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_string()
    }
}

/// Errors that can occur when parsing tags.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    /// The input string is not a well-formed tag of any supported kind.
    #[error("\"{0}\" is not a valid tag")]
    NotValid(String),
}

fn is_valid_user_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-'))
}

fn is_valid_machine_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) && (id == "0" || !id.starts_with('0'))
}

fn is_valid_application_name(name: &str) -> bool {
    // Lowercase DNS-label-like, hyphen-separated words, and the final word
    // must not be numeric (a trailing number would be ambiguous with a
    // unit's tag form).
    if name.is_empty() || name.starts_with('-') || name.ends_with('-') || name.contains("--") {
        return false;
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return false;
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return false;
    }
    let last_word = name.rsplit('-').next().unwrap_or(name);
    !last_word.chars().all(|c| c.is_ascii_digit())
}

fn is_valid_unit_name(name: &str) -> bool {
    match name.split_once('/') {
        Some((app, number)) => {
            is_valid_application_name(app)
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
                && (number == "0" || !number.starts_with('0'))
        }
        None => false,
    }
}

/// Convert a unit tag body (`mysql-0`, `my-app-3`) back to the unit name.
///
/// The unit number is everything after the last hyphen; application names
/// never end in a numeric word, so the split is unambiguous.
fn unit_tag_body_to_name(body: &str) -> Option<String> {
    let (app, number) = body.rsplit_once('-')?;
    let name = format!("{app}/{number}");
    is_valid_unit_name(&name).then_some(name)
}

fn is_valid_relation_key(key: &str) -> bool {
    fn is_endpoint(s: &str) -> bool {
        match s.split_once('.') {
            Some((app, endpoint)) => {
                is_valid_application_name(app)
                    && !endpoint.is_empty()
                    && endpoint
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            }
            None => false,
        }
    }

    match key.split_once('#') {
        Some((left, right)) => is_endpoint(left) && is_endpoint(right),
        None => is_endpoint(key), // peer relation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_kinds() {
        let tags = [
            "user-admin",
            "user-bob+ops",
            "machine-0",
            "machine-42",
            "unit-mysql-0",
            "unit-my-app-3",
            "application-wordpress",
            "relation-wordpress.db#mysql.server",
            "relation-riak.ring",
            "model-550e8400-e29b-41d4-a716-446655440000",
        ];
        for s in tags {
            let tag = Tag::parse(s).unwrap();
            assert_eq!(tag.to_string(), s, "round trip failed for {s}");
            assert_eq!(Tag::parse(&tag.to_string()).unwrap(), tag);
        }
    }

    #[test]
    fn unit_tag_names() {
        let tag = Tag::parse("unit-mysql-0").unwrap();
        assert_eq!(tag.id(), "mysql/0");
        assert_eq!(tag.kind(), TagKind::Unit);

        let tag = Tag::parse("unit-my-app-12").unwrap();
        assert_eq!(tag.id(), "my-app/12");
    }

    #[test]
    fn malformed_tags_rejected() {
        let bad = [
            "",
            "-",
            "mysql",
            "wordpress:db mysql:server",
            "user-",
            "user-0admin",
            "machine-abc",
            "machine-01",
            "unit-mysql",
            "unit-mysql-",
            "unit--0",
            "application-MySQL",
            "application-app-0",
            "service-mysql",
            "model-not-a-uuid",
        ];
        for s in bad {
            let err = Tag::parse(s).unwrap_err();
            assert_eq!(err, TagError::NotValid(s.to_string()), "accepted {s:?}");
        }
    }

    #[test]
    fn not_valid_message() {
        let err = Tag::parse("wordpress:db mysql:server").unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"wordpress:db mysql:server\" is not a valid tag"
        );
    }

    #[test]
    fn constructors_validate() {
        assert!(Tag::unit("mysql/0").is_ok());
        assert!(Tag::unit("mysql-0").is_err());
        assert!(Tag::machine("3").is_ok());
        assert!(Tag::machine("3/lxd/1").is_err());
        assert!(Tag::user("admin").is_ok());
        assert!(Tag::user("").is_err());
    }

    #[test]
    fn serde_round_trip() {
        let tag = Tag::parse("unit-mysql-0").unwrap();
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, "\"unit-mysql-0\"");
        let parsed: Tag = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tag);
    }

    #[test]
    fn serde_rejects_malformed() {
        let result: Result<Tag, _> = serde_json::from_str("\"not a tag\"");
        assert!(result.is_err());
    }
}
