//! Configuration types for the directory client.

use crate::{dn::DistinguishedName, Result};
use cshldap_core::Error;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use validator::{Validate, ValidationError};

/// Default directory endpoint.
pub const DEFAULT_URL: &str = "ldaps://ldap.csh.rit.edu:636";
/// Default subtree holding member entries.
pub const DEFAULT_USERS_DN: &str = "ou=Users,dc=csh,dc=rit,dc=edu";
/// Default subtree holding group entries.
pub const DEFAULT_GROUPS_DN: &str = "ou=Groups,dc=csh,dc=rit,dc=edu";
/// Default subtree holding committee entries.
pub const DEFAULT_COMMITTEES_DN: &str = "ou=Committees,dc=csh,dc=rit,dc=edu";
/// Default context under which application accounts bind.
pub const DEFAULT_BIND_BASE: &str = "ou=Apps,dc=csh,dc=rit,dc=edu";
/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Configuration for connecting to the member directory.
///
/// The directory topology (users, groups and committees subtrees) is explicit here so the
/// client never embeds fixed DNs; every field defaults to the production CSH layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DirectoryConfig {
    /// Directory URL (`ldap://` or `ldaps://`)
    #[validate(url)]
    #[serde(default = "default_url")]
    url: String,

    /// Base used by searches that do not name one
    #[validate(custom(function = "validate_dn"))]
    #[serde(default = "default_users_dn")]
    search_base: String,

    /// Context under which application accounts bind
    #[validate(custom(function = "validate_dn"))]
    #[serde(default = "default_bind_base")]
    bind_base: String,

    /// Users subtree
    #[validate(custom(function = "validate_dn"))]
    #[serde(default = "default_users_dn")]
    users_dn: String,

    /// Groups subtree
    #[validate(custom(function = "validate_dn"))]
    #[serde(default = "default_groups_dn")]
    groups_dn: String,

    /// Committees subtree
    #[validate(custom(function = "validate_dn"))]
    #[serde(default = "default_committees_dn")]
    committees_dn: String,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    tls_verify: bool,

    /// Optional path to a custom CA certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tls_ca_cert: Option<PathBuf>,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_connection_timeout_secs")]
    connection_timeout_secs: u64,

    /// Per-operation timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_operation_timeout_secs")]
    operation_timeout_secs: u64,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_users_dn() -> String {
    DEFAULT_USERS_DN.to_string()
}

fn default_groups_dn() -> String {
    DEFAULT_GROUPS_DN.to_string()
}

fn default_committees_dn() -> String {
    DEFAULT_COMMITTEES_DN.to_string()
}

fn default_bind_base() -> String {
    DEFAULT_BIND_BASE.to_string()
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

fn validate_dn(value: &str) -> std::result::Result<(), ValidationError> {
    DistinguishedName::parse(value)
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_dn"))
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            search_base: default_users_dn(),
            bind_base: default_bind_base(),
            users_dn: default_users_dn(),
            groups_dn: default_groups_dn(),
            committees_dn: default_committees_dn(),
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        }
    }
}

impl DirectoryConfig {
    /// Creates a configuration for the given directory URL with the default layout.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or does not use an LDAP scheme.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let config = Self {
            url: url.into(),
            ..Self::default()
        };
        config.check()?;
        Ok(config)
    }

    /// Validates every field, including the LDAP scheme of the URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] for malformed fields and [`Error::InvalidEndpoint`]
    /// when the URL is not `ldap://`, `ldaps://` or `ldapi://`.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        let parsed = Url::parse(&self.url)?;
        match parsed.scheme() {
            "ldap" | "ldaps" | "ldapi" => Ok(()),
            other => Err(Error::InvalidEndpoint(format!(
                "unsupported directory scheme `{other}`"
            ))),
        }
    }

    /// Returns the directory endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Host name of the directory, used as the GSSAPI service principal host.
    #[must_use]
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
    }

    /// Returns the default search base.
    #[must_use]
    pub fn search_base(&self) -> &str {
        &self.search_base
    }

    /// Returns the context under which application accounts bind.
    #[must_use]
    pub fn bind_base(&self) -> &str {
        &self.bind_base
    }

    /// Returns the users subtree.
    #[must_use]
    pub fn users_dn(&self) -> &str {
        &self.users_dn
    }

    /// Returns the groups subtree.
    #[must_use]
    pub fn groups_dn(&self) -> &str {
        &self.groups_dn
    }

    /// Returns the committees subtree.
    #[must_use]
    pub fn committees_dn(&self) -> &str {
        &self.committees_dn
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Overrides the default search base.
    #[must_use]
    pub fn with_search_base(mut self, dn: impl Into<String>) -> Self {
        self.search_base = dn.into();
        self
    }

    /// Overrides the application bind context.
    #[must_use]
    pub fn with_bind_base(mut self, dn: impl Into<String>) -> Self {
        self.bind_base = dn.into();
        self
    }

    /// Overrides the users subtree.
    ///
    /// The default search base follows the users subtree unless it was overridden separately.
    #[must_use]
    pub fn with_users_dn(mut self, dn: impl Into<String>) -> Self {
        let dn = dn.into();
        if self.search_base == self.users_dn {
            self.search_base.clone_from(&dn);
        }
        self.users_dn = dn;
        self
    }

    /// Overrides the groups subtree.
    #[must_use]
    pub fn with_groups_dn(mut self, dn: impl Into<String>) -> Self {
        self.groups_dn = dn.into();
        self
    }

    /// Overrides the committees subtree.
    #[must_use]
    pub fn with_committees_dn(mut self, dn: impl Into<String>) -> Self {
        self.committees_dn = dn.into();
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_csh_layout() {
        let config = DirectoryConfig::default();
        assert_eq!(config.url(), "ldaps://ldap.csh.rit.edu:636");
        assert_eq!(config.search_base(), "ou=Users,dc=csh,dc=rit,dc=edu");
        assert_eq!(config.users_dn(), "ou=Users,dc=csh,dc=rit,dc=edu");
        assert_eq!(config.groups_dn(), "ou=Groups,dc=csh,dc=rit,dc=edu");
        assert_eq!(config.committees_dn(), "ou=Committees,dc=csh,dc=rit,dc=edu");
        assert_eq!(config.bind_base(), "ou=Apps,dc=csh,dc=rit,dc=edu");
        assert_eq!(config.host().as_deref(), Some("ldap.csh.rit.edu"));
        assert!(config.check().is_ok());
    }

    #[test]
    fn builder_overrides() {
        let config = DirectoryConfig::new("ldap://localhost:389")
            .unwrap()
            .with_users_dn("ou=People,dc=example,dc=com")
            .with_groups_dn("ou=Groups,dc=example,dc=com")
            .with_committees_dn("ou=Committees,dc=example,dc=com")
            .with_bind_base("ou=Services,dc=example,dc=com")
            .with_connection_timeout_secs(20)
            .with_operation_timeout_secs(45)
            .with_tls_verification(false);

        assert_eq!(config.users_dn(), "ou=People,dc=example,dc=com");
        assert_eq!(config.search_base(), "ou=People,dc=example,dc=com");
        assert_eq!(config.bind_base(), "ou=Services,dc=example,dc=com");
        assert_eq!(config.connection_timeout(), Duration::from_secs(20));
        assert_eq!(config.operation_timeout(), Duration::from_secs(45));
        assert!(!config.tls_verify());
        assert!(config.check().is_ok());
    }

    #[test]
    fn explicit_search_base_survives_users_override() {
        let config = DirectoryConfig::default()
            .with_search_base("dc=csh,dc=rit,dc=edu")
            .with_users_dn("ou=People,dc=csh,dc=rit,dc=edu");
        assert_eq!(config.search_base(), "dc=csh,dc=rit,dc=edu");
    }

    #[test]
    fn rejects_non_ldap_scheme() {
        let err = DirectoryConfig::new("https://ldap.csh.rit.edu").unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint(_)));
    }

    #[test]
    fn rejects_malformed_url() {
        let err = DirectoryConfig::new("not a url").unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[test]
    fn rejects_out_of_range_timeout() {
        let config = DirectoryConfig::default().with_operation_timeout_secs(0);
        assert!(matches!(config.check(), Err(Error::ValidationError(_))));
    }

    #[test]
    fn rejects_malformed_dn() {
        let config = DirectoryConfig::default().with_groups_dn("ou=Groups,");
        assert!(matches!(config.check(), Err(Error::ValidationError(_))));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: DirectoryConfig =
            serde_json::from_str(r#"{"url": "ldap://127.0.0.1:3389", "tls_verify": false}"#)
                .unwrap();
        assert_eq!(config.url(), "ldap://127.0.0.1:3389");
        assert_eq!(config.groups_dn(), DEFAULT_GROUPS_DN);
        assert_eq!(
            config.operation_timeout(),
            Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS)
        );
        assert!(!config.tls_verify());
    }
}
