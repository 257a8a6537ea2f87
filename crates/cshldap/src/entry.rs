//! Raw directory entries and the result shapes a search can produce.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::client::DirectoryClient;

/// Attribute map of one entry; values keep the order the server returned them in.
pub type Attributes = HashMap<String, Vec<String>>;

/// LDAP entry representation used by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map.
    pub attributes: Attributes,
}

impl LdapEntry {
    /// Creates an entry from its DN and attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns all values for the attribute, or an empty slice.
    #[must_use]
    pub fn values(&self, attribute: &str) -> &[String] {
        self.attributes
            .get(attribute)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Sets an attribute that was derived client-side rather than read from the server.
    pub(crate) fn insert(&mut self, attribute: &str, values: Vec<String>) {
        self.attributes.insert(attribute.to_string(), values);
    }
}

/// Shape a search result is returned in.
///
/// Implemented for [`LdapEntry`] (DN plus attributes), [`Attributes`] (attributes only) and
/// [`crate::Member`] (record view bound to the producing client).
pub trait FromDirectoryEntry: Sized {
    /// Converts one processed entry.
    fn from_entry(entry: LdapEntry, client: &DirectoryClient) -> Self;
}

impl FromDirectoryEntry for LdapEntry {
    fn from_entry(entry: LdapEntry, _client: &DirectoryClient) -> Self {
        entry
    }
}

impl FromDirectoryEntry for Attributes {
    fn from_entry(entry: LdapEntry, _client: &DirectoryClient) -> Self {
        entry.attributes
    }
}
