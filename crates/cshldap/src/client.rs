//! Member directory client implementation.

use crate::{
    config::DirectoryConfig,
    dn::DistinguishedName,
    entry::{Attributes, FromDirectoryEntry, LdapEntry},
    filter::{SearchQuery, SearchTarget},
    member::{AttributeWriter, COMMITTEE_ATTRIBUTE, GROUPS_ATTRIBUTE},
    Result,
};
use async_trait::async_trait;
use cshldap_core::{BindCredentials, Error};
use ldap3::{LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// User attributes plus operational attributes.
const REQUESTED_ATTRIBUTES: &[&str] = &["*", "+"];

const EBOARD_GROUP: &str = "eboard";
const DRINK_GROUP: &str = "drink";
const RTP_GROUP: &str = "rtp";

const KINIT_HINT: &str = "are you sure you've run kinit?";

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// LDAP modification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Replace attribute values.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
}

impl DirectoryModification {
    /// Attribute targeted by this modification.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Replace { attribute, .. } => attribute,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn gssapi_bind(&mut self, server_fqdn: &str) -> Result<()>;
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>>;
    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

#[derive(Debug)]
enum BindState {
    Bound,
    Unbound(String),
}

/// Client owning one directory connection.
///
/// Cloning is cheap and shares the connection; operations from clones are serialized on it.
#[derive(Clone)]
pub struct DirectoryClient {
    config: Arc<DirectoryConfig>,
    session: Arc<Mutex<Box<dyn LdapSession>>>,
    bind_state: Arc<BindState>,
}

impl fmt::Debug for DirectoryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryClient")
            .field("url", &self.config.url())
            .field("bind_state", &self.bind_state)
            .finish_non_exhaustive()
    }
}

impl DirectoryClient {
    /// Connects to the directory and binds with the given credentials.
    ///
    /// Service credentials perform a simple bind as `cn=<user>,<bind base>`. Interactive
    /// credentials perform a SASL/GSSAPI bind; if that fails the client is still returned, in
    /// the unbound state, with the diagnostic available from [`Self::bind_error`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the server cannot be reached, or a
    /// service-account bind is rejected.
    pub async fn connect(config: DirectoryConfig, credentials: BindCredentials) -> Result<Self> {
        config.check()?;
        let config = Arc::new(config);
        let connector = RealLdapConnector::new(config.clone());
        Self::connect_with(config, &credentials, &connector).await
    }

    async fn connect_with(
        config: Arc<DirectoryConfig>,
        credentials: &BindCredentials,
        connector: &dyn LdapConnector,
    ) -> Result<Self> {
        let mut session = connector.connect().await?;

        let bind_state = match credentials {
            BindCredentials::Service { user, .. } => {
                let bind_dn =
                    DistinguishedName::parse(config.bind_base())?.child("cn", user.as_str());
                debug!(bind_dn = %bind_dn, "performing simple bind");
                session
                    .simple_bind(&bind_dn.to_string(), credentials.password().unwrap_or_default())
                    .await?;
                info!(url = config.url(), bind_dn = %bind_dn, "directory bind succeeded");
                BindState::Bound
            }
            BindCredentials::Interactive => {
                let host = config.host().unwrap_or_default();
                match session.gssapi_bind(&host).await {
                    Ok(()) => {
                        info!(url = config.url(), "GSSAPI bind succeeded");
                        BindState::Bound
                    }
                    Err(err) => {
                        warn!(error = %err, "GSSAPI bind failed; {KINIT_HINT}");
                        BindState::Unbound(format!("{err} ({KINIT_HINT})"))
                    }
                }
            }
        };

        Ok(Self {
            config,
            session: Arc::new(Mutex::new(session)),
            bind_state: Arc::new(bind_state),
        })
    }

    /// Returns the configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Returns true when the bind succeeded.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(*self.bind_state, BindState::Bound)
    }

    /// Diagnostic from a failed interactive bind.
    #[must_use]
    pub fn bind_error(&self) -> Option<&str> {
        match &*self.bind_state {
            BindState::Bound => None,
            BindState::Unbound(reason) => Some(reason),
        }
    }

    /// Runs a search and returns the entries in the requested shape.
    ///
    /// Searches whose base is the users subtree attach a `groups` attribute to every entry,
    /// and a `committee` attribute to members of `eboard`.
    ///
    /// # Errors
    ///
    /// Returns any directory protocol error unchanged, or [`Error::NotBound`] if the bind
    /// failed.
    pub async fn search<T: FromDirectoryEntry>(&self, query: &SearchQuery) -> Result<Vec<T>> {
        let entries = self.search_entries(query).await?;
        Ok(self.shape(entries))
    }

    /// Every member whose uid matches `uid_pattern` (`*` for all members).
    ///
    /// # Errors
    ///
    /// Returns any directory protocol error unchanged.
    pub async fn members<T: FromDirectoryEntry>(&self, uid_pattern: &str) -> Result<Vec<T>> {
        self.search(&SearchQuery::new().term("uid", uid_pattern)).await
    }

    /// The member with exactly this uid, or `None`.
    ///
    /// # Errors
    ///
    /// Returns any directory protocol error unchanged.
    pub async fn member<T: FromDirectoryEntry>(&self, uid: &str) -> Result<Option<T>> {
        let entries = self
            .search_entries(&SearchQuery::new().term("uid", uid))
            .await?;
        Ok(self.shape(entries).into_iter().next())
    }

    /// Heads of every committee, each tagged with its committee's `cn` under `committee`.
    ///
    /// A committee with several heads yields one entry per head.
    ///
    /// # Errors
    ///
    /// Returns any directory protocol error unchanged.
    pub async fn eboard<T: FromDirectoryEntry>(&self) -> Result<Vec<T>> {
        let committees = self
            .run_search(
                &SearchQuery::new()
                    .base(self.config.committees_dn())
                    .term("cn", "*")
                    .resolve(self.config.search_base()),
            )
            .await?;

        let mut directors = Vec::new();
        for committee in &committees {
            let Some(name) = committee.first("cn") else {
                warn!(dn = %committee.dn, "committee entry has no cn");
                continue;
            };
            for head in committee.values("head") {
                if let Some(mut director) = self.lookup_dn(head).await? {
                    director.insert(COMMITTEE_ATTRIBUTE, vec![name.to_string()]);
                    directors.push(director);
                }
            }
        }
        Ok(self.shape(directors))
    }

    /// Members of the group with common name `group_cn`; empty if the group does not exist.
    ///
    /// # Errors
    ///
    /// Returns any directory protocol error unchanged.
    pub async fn group<T: FromDirectoryEntry>(&self, group_cn: &str) -> Result<Vec<T>> {
        let groups = self
            .run_search(
                &SearchQuery::new()
                    .base(self.config.groups_dn())
                    .term("cn", group_cn)
                    .resolve(self.config.search_base()),
            )
            .await?;
        let Some(group) = groups.first() else {
            debug!(group = group_cn, "group not found");
            return Ok(Vec::new());
        };

        let mut members = Vec::new();
        for member_dn in group.values("member") {
            if let Some(member) = self.lookup_dn(member_dn).await? {
                members.push(member);
            }
        }
        Ok(self.shape(members))
    }

    /// Members of the `drink` group.
    ///
    /// # Errors
    ///
    /// Returns any directory protocol error unchanged.
    pub async fn drink_admins<T: FromDirectoryEntry>(&self) -> Result<Vec<T>> {
        self.group(DRINK_GROUP).await
    }

    /// Members of the `rtp` group.
    ///
    /// # Errors
    ///
    /// Returns any directory protocol error unchanged.
    pub async fn rtps<T: FromDirectoryEntry>(&self) -> Result<Vec<T>> {
        self.group(RTP_GROUP).await
    }

    /// Common names of every group whose `member` attribute contains `dn`, in server order.
    ///
    /// # Errors
    ///
    /// Returns any directory protocol error unchanged.
    pub async fn get_groups(&self, dn: &str) -> Result<Vec<String>> {
        let groups = self
            .run_search(
                &SearchQuery::new()
                    .base(self.config.groups_dn())
                    .term("member", dn)
                    .resolve(self.config.search_base()),
            )
            .await?;
        Ok(groups
            .iter()
            .filter_map(|group| group.first("cn").map(str::to_owned))
            .collect())
    }

    /// Replaces attributes of the member `uid` with single stringified values.
    ///
    /// Only attributes already present on the entry are changed; others, and the derived
    /// `groups` / `committee` attributes, are ignored. Unchanged values are left out of the
    /// request, and nothing is sent when no attribute changes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the member does not exist and the directory's error
    /// if the modification is rejected.
    pub async fn modify<I, K, V>(&self, uid: &str, changes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let current: Attributes = self
            .member(uid)
            .await?
            .ok_or_else(|| Error::InvalidRequest(format!("member `{uid}` not found")))?;

        let modifications = diff_attributes(&current, changes);
        if modifications.is_empty() {
            debug!(uid, "no attribute changes to send");
            return Ok(());
        }

        let dn = DistinguishedName::parse(self.config.users_dn())?.child("uid", uid);
        debug!(dn = %dn, count = modifications.len(), "modifying entry");
        self.ensure_bound()?;
        let mut session = self.session.lock().await;
        session.modify(&dn.to_string(), &modifications).await?;
        info!(dn = %dn, "entry modified");
        Ok(())
    }

    /// Unbinds and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns the directory's error if the unbind fails.
    pub async fn close(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        session.unbind().await
    }

    async fn search_entries(&self, query: &SearchQuery) -> Result<Vec<LdapEntry>> {
        let target = query.resolve(self.config.search_base());
        let mut entries = self.run_search(&target).await?;
        if self.is_users_base(&target.base) {
            for entry in &mut entries {
                self.attach_memberships(entry).await?;
            }
        }
        Ok(entries)
    }

    async fn attach_memberships(&self, entry: &mut LdapEntry) -> Result<()> {
        let groups = self.get_groups(&entry.dn).await?;
        let is_eboard = groups.iter().any(|group| group == EBOARD_GROUP);
        entry.insert(GROUPS_ATTRIBUTE, groups);

        if !is_eboard {
            entry.attributes.remove(COMMITTEE_ATTRIBUTE);
            return Ok(());
        }

        let committees = self
            .run_search(
                &SearchQuery::new()
                    .base(self.config.committees_dn())
                    .term("head", &entry.dn)
                    .resolve(self.config.search_base()),
            )
            .await?;
        match committees.first().and_then(|committee| committee.first("cn")) {
            Some(name) => entry.insert(COMMITTEE_ATTRIBUTE, vec![name.to_string()]),
            None => warn!(dn = %entry.dn, "eboard member heads no committee"),
        }
        Ok(())
    }

    async fn lookup_dn(&self, dn: &str) -> Result<Option<LdapEntry>> {
        let entries = self
            .search_entries(&SearchQuery::new().term("dn", dn))
            .await?;
        Ok(entries.into_iter().next())
    }

    async fn run_search(&self, target: &SearchTarget) -> Result<Vec<LdapEntry>> {
        self.ensure_bound()?;
        debug!(base = %target.base, filter = %target.filter, "searching directory");
        let mut session = self.session.lock().await;
        session
            .search(
                &target.base,
                target.scope,
                &target.filter,
                REQUESTED_ATTRIBUTES,
            )
            .await
    }

    fn ensure_bound(&self) -> Result<()> {
        match &*self.bind_state {
            BindState::Bound => Ok(()),
            BindState::Unbound(reason) => Err(Error::NotBound(reason.clone())),
        }
    }

    fn is_users_base(&self, base: &str) -> bool {
        match (
            DistinguishedName::parse(base),
            DistinguishedName::parse(self.config.users_dn()),
        ) {
            (Ok(base), Ok(users)) => base == users,
            _ => base.eq_ignore_ascii_case(self.config.users_dn()),
        }
    }

    fn shape<T: FromDirectoryEntry>(&self, entries: Vec<LdapEntry>) -> Vec<T> {
        entries
            .into_iter()
            .map(|entry| T::from_entry(entry, self))
            .collect()
    }
}

#[async_trait]
impl AttributeWriter for DirectoryClient {
    async fn write_attributes(&self, uid: &str, changes: Vec<(String, String)>) -> Result<()> {
        self.modify(uid, changes).await
    }

    async fn fetch_attributes(&self, uid: &str) -> Result<Option<Attributes>> {
        self.member(uid).await
    }
}

/// Stages single-valued replacements for attributes already present in `current`.
fn diff_attributes<I, K, V>(current: &Attributes, changes: I) -> Vec<DirectoryModification>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    let mut modifications: Vec<DirectoryModification> = Vec::new();
    for (attribute, value) in changes {
        let attribute = attribute.into();
        if attribute == GROUPS_ATTRIBUTE || attribute == COMMITTEE_ATTRIBUTE {
            warn!(attribute = %attribute, "derived attribute cannot be written");
            continue;
        }
        let Some(existing) = current.get(&attribute) else {
            debug!(attribute = %attribute, "attribute not present on entry; ignoring");
            continue;
        };

        modifications.retain(|modification| modification.attribute() != attribute);
        let values = vec![value.to_string()];
        if *existing != values {
            modifications.push(DirectoryModification::Replace { attribute, values });
        }
    }
    modifications
}

/// Real LDAP connector backed by `ldap3`.
struct RealLdapConnector {
    config: Arc<DirectoryConfig>,
}

impl RealLdapConnector {
    fn new(config: Arc<DirectoryConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let settings = build_ldap_settings(&self.config)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, self.config.url())
            .await
            .map_err(map_ldap_error)?;
        ldap3::drive!(conn);
        debug!(url = self.config.url(), "directory connection established");
        Ok(Box::new(RealLdapSession {
            inner: ldap,
            operation_timeout: self.config.operation_timeout(),
        }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let fut = self.inner.simple_bind(dn, password);
        let result = timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| Error::Timeout("directory bind timed out".to_string()))?
            .map_err(map_ldap_error)?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    #[cfg(feature = "gssapi")]
    async fn gssapi_bind(&mut self, server_fqdn: &str) -> Result<()> {
        let fut = self.inner.sasl_gssapi_bind(server_fqdn);
        let result = timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| Error::Timeout("directory GSSAPI bind timed out".to_string()))?
            .map_err(map_ldap_error)?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    #[cfg(not(feature = "gssapi"))]
    async fn gssapi_bind(&mut self, server_fqdn: &str) -> Result<()> {
        Err(Error::ConfigError(format!(
            "cannot bind to {server_fqdn} with GSSAPI: built without the `gssapi` feature"
        )))
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        let fut = self
            .inner
            .search(base_dn, scope.into(), filter, attributes.to_vec());
        let result = timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| Error::Timeout("directory search timed out".to_string()))?
            .map_err(map_ldap_error)?;
        let (entries, _) = result.success().map_err(map_ldap_error)?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry::new(entry.dn, entry.attrs))
            .collect())
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(|m| match m {
                DirectoryModification::Replace { attribute, values } => Mod::Replace(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
            })
            .collect::<Vec<_>>();

        let fut = self.inner.modify(dn, mods);
        let result = timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| Error::Timeout("directory modify timed out".to_string()))?
            .map_err(map_ldap_error)?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::Timeout("directory unbind timed out".to_string()))?
            .map_err(map_ldap_error)?;
        Ok(())
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read directory CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem).map_err(|err| {
            Error::ConfigError(format!("invalid directory CA certificate: {err}"))
        })?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to load directory CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(err: ldap3::LdapError) -> Error {
    Error::ldap(err.to_string())
}
