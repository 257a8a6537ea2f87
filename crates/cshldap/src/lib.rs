//! Client for the CSH member directory (LDAP).
//!
//! This crate connects to the directory, turns member, group and committee queries into LDAP
//! searches, attaches derived `groups` / `committee` attributes to user entries and wraps
//! entries in [`Member`] record views with typed accessors and write-through updates.

#![deny(missing_docs)]

mod client;
mod config;
mod dn;
mod entry;
mod filter;
mod member;
mod timestamp;
mod value;

pub use client::{DirectoryClient, DirectoryModification, SearchScope};
pub use config::{
    DirectoryConfig, DEFAULT_BIND_BASE, DEFAULT_COMMITTEES_DN, DEFAULT_CONNECTION_TIMEOUT_SECS,
    DEFAULT_GROUPS_DN, DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_URL, DEFAULT_USERS_DN,
};
pub use cshldap_core::{BindCredentials, Error};
pub use dn::{DistinguishedName, DistinguishedNameError};
pub use entry::{Attributes, FromDirectoryEntry, LdapEntry};
pub use filter::{SearchQuery, SearchTarget};
pub use member::{AttributeWriter, KnownAttribute, Member};
pub use timestamp::{age_on, date_from_ldap_timestamp, is_birthday_on};
pub use value::AttributeValue;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = cshldap_core::Result<T>;
