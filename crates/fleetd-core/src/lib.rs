//! Core types and utilities for fleetd.
//!
//! This crate provides the foundational identity types used throughout the
//! fleetd control plane:
//!
//! - **Tags**: strongly-typed entity identities (kind + name) with a stable
//!   string form
//! - **Tag errors**: the universal "not a valid tag" gate applied before any
//!   authentication or entity lookup
//!
//! # Example
//!
//! ```
//! use fleetd_core::Tag;
//!
//! let tag: Tag = "unit-mysql-0".parse().unwrap();
//! assert_eq!(tag.id(), "mysql/0");
//! assert_eq!(tag.to_string(), "unit-mysql-0");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod tags;

pub use tags::{Tag, TagError, TagKind};
