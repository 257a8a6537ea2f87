//! Bind credentials for the member directory.

use secrecy::{ExposeSecret, SecretString};

/// How the client authenticates after connecting.
#[derive(Debug)]
pub enum BindCredentials {
    /// Simple bind as an application account, `cn=<user>,<bind base>`.
    Service {
        /// Application account name (the `cn` of the bind entry)
        user: String,
        /// Application account password
        password: SecretString,
    },
    /// SASL/GSSAPI bind using a ticket already present in the Kerberos credential cache.
    Interactive,
}

impl BindCredentials {
    /// Creates service-account credentials.
    #[must_use]
    pub fn service(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Service {
            user: user.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Creates credentials for an interactive user relying on `kinit`.
    #[must_use]
    pub const fn interactive() -> Self {
        Self::Interactive
    }

    /// Returns true for application (simple bind) credentials.
    #[must_use]
    pub const fn is_service(&self) -> bool {
        matches!(self, Self::Service { .. })
    }

    /// Returns the bind password for service credentials.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        match self {
            Self::Service { password, .. } => Some(password.expose_secret()),
            Self::Interactive => None,
        }
    }
}
