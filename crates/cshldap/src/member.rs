//! Record view over one member entry.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use cshldap_core::Error;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::{
    client::DirectoryClient,
    entry::{Attributes, FromDirectoryEntry, LdapEntry},
    timestamp::{age_on, date_from_ldap_timestamp, is_birthday_on},
    value::AttributeValue,
    Result,
};

/// Derived attribute listing the common names of the groups an entry belongs to.
pub(crate) const GROUPS_ATTRIBUTE: &str = "groups";
/// Derived attribute naming the committee an eboard member heads.
pub(crate) const COMMITTEE_ATTRIBUTE: &str = "committee";

/// Attributes with a meaning the record view knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownAttribute {
    /// `uid`
    Uid,
    /// `cn`
    Cn,
    /// `active`
    Active,
    /// `alumni`
    Alumni,
    /// `drinkAdmin`
    DrinkAdmin,
    /// `onfloor`
    OnFloor,
    /// `birthday`
    Birthday,
    /// `memberSince`
    MemberSince,
    /// `groups` (derived)
    Groups,
    /// `committee` (derived)
    Committee,
}

impl KnownAttribute {
    /// Directory attribute name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uid => "uid",
            Self::Cn => "cn",
            Self::Active => "active",
            Self::Alumni => "alumni",
            Self::DrinkAdmin => "drinkAdmin",
            Self::OnFloor => "onfloor",
            Self::Birthday => "birthday",
            Self::MemberSince => "memberSince",
            Self::Groups => GROUPS_ATTRIBUTE,
            Self::Committee => COMMITTEE_ATTRIBUTE,
        }
    }
}

impl fmt::Display for KnownAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The part of the directory client a [`Member`] needs for writes and reloads.
#[async_trait]
pub trait AttributeWriter: Send + Sync {
    /// Replaces attributes of member `uid`; see [`DirectoryClient::modify`].
    async fn write_attributes(&self, uid: &str, changes: Vec<(String, String)>) -> Result<()>;

    /// Fetches the current attributes of member `uid`.
    async fn fetch_attributes(&self, uid: &str) -> Result<Option<Attributes>>;
}

/// Record view over one member entry.
///
/// Reads are served from the local attribute map. Writes go to the directory first and only
/// touch the local map once the directory accepted them.
pub struct Member {
    dn: Option<String>,
    attributes: Attributes,
    writer: Option<Arc<dyn AttributeWriter>>,
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("dn", &self.dn)
            .field("attributes", &self.attributes)
            .field("attached", &self.writer.is_some())
            .finish()
    }
}

impl Member {
    /// Wraps an attribute map that is not attached to any directory.
    #[must_use]
    pub fn new(attributes: Attributes) -> Self {
        Self {
            dn: None,
            attributes,
            writer: None,
        }
    }

    /// Wraps a directory entry without attaching a writer.
    #[must_use]
    pub fn from_ldap_entry(entry: LdapEntry) -> Self {
        Self {
            dn: Some(entry.dn),
            attributes: entry.attributes,
            writer: None,
        }
    }

    /// Attaches the capability used by [`Self::set`] and [`Self::reload`].
    #[must_use]
    pub fn with_writer(mut self, writer: Arc<dyn AttributeWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Distinguished name of the entry, when it came from a search.
    #[must_use]
    pub fn dn(&self) -> Option<&str> {
        self.dn.as_deref()
    }

    /// The underlying attribute map.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Names of the attributes currently present.
    #[must_use]
    pub fn fields(&self) -> BTreeSet<&str> {
        self.attributes.keys().map(String::as_str).collect()
    }

    /// Coerced value of any attribute, `None` when absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<AttributeValue> {
        self.attributes
            .get(name)
            .and_then(|values| AttributeValue::from_values(values))
    }

    /// Coerced value of a known attribute.
    #[must_use]
    pub fn attribute(&self, attribute: KnownAttribute) -> Option<AttributeValue> {
        self.get(attribute.as_str())
    }

    fn first(&self, attribute: KnownAttribute) -> Option<&str> {
        self.attributes
            .get(attribute.as_str())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    fn flag(&self, attribute: KnownAttribute) -> bool {
        self.attribute(attribute)
            .is_some_and(|value| value.is_truthy())
    }

    /// The member's uid.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.first(KnownAttribute::Uid)
    }

    /// The member's common name.
    #[must_use]
    pub fn cn(&self) -> Option<&str> {
        self.first(KnownAttribute::Cn)
    }

    /// Groups attached by the client; empty for entries fetched outside the users subtree.
    #[must_use]
    pub fn groups(&self) -> &[String] {
        self.attributes
            .get(GROUPS_ATTRIBUTE)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Committee headed by this member, if any.
    #[must_use]
    pub fn committee(&self) -> Option<&str> {
        self.first(KnownAttribute::Committee)
    }

    /// `active` is set.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.flag(KnownAttribute::Active)
    }

    /// `alumni` is set.
    #[must_use]
    pub fn is_alumni(&self) -> bool {
        self.flag(KnownAttribute::Alumni)
    }

    /// `drinkAdmin` is set.
    #[must_use]
    pub fn is_drink_admin(&self) -> bool {
        self.flag(KnownAttribute::DrinkAdmin)
    }

    /// `onfloor` is set.
    #[must_use]
    pub fn is_on_floor(&self) -> bool {
        self.flag(KnownAttribute::OnFloor)
    }

    /// Member of the `eboard` group.
    #[must_use]
    pub fn is_eboard(&self) -> bool {
        self.groups().iter().any(|group| group == "eboard")
    }

    /// Member of the `rtp` group.
    #[must_use]
    pub fn is_rtp(&self) -> bool {
        self.groups().iter().any(|group| group == "rtp")
    }

    fn date_of(&self, attribute: KnownAttribute) -> Result<Option<NaiveDate>> {
        match self.first(attribute) {
            Some(timestamp) if !timestamp.is_empty() => {
                date_from_ldap_timestamp(timestamp).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Date of birth from `birthday`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimestamp`] if the stored value is malformed.
    pub fn birthdate(&self) -> Result<Option<NaiveDate>> {
        self.date_of(KnownAttribute::Birthday)
    }

    /// Date the member joined, from `memberSince`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimestamp`] if the stored value is malformed.
    pub fn joindate(&self) -> Result<Option<NaiveDate>> {
        self.date_of(KnownAttribute::MemberSince)
    }

    /// True when today is the member's birthday.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimestamp`] if `birthday` is malformed.
    pub fn is_birthday(&self) -> Result<bool> {
        self.is_birthday_on(Local::now().date_naive())
    }

    /// True when `today` is the member's birthday; false without a birthday.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimestamp`] if `birthday` is malformed.
    pub fn is_birthday_on(&self, today: NaiveDate) -> Result<bool> {
        Ok(self
            .birthdate()?
            .is_some_and(|birthdate| is_birthday_on(birthdate, today)))
    }

    /// Age in whole years today, or `-1` when no birthday is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimestamp`] if `birthday` is malformed.
    pub fn age(&self) -> Result<i32> {
        self.age_on(Local::now().date_naive())
    }

    /// Age in whole years on `today`, or `-1` when no birthday is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimestamp`] if `birthday` is malformed.
    pub fn age_on(&self, today: NaiveDate) -> Result<i32> {
        Ok(self
            .birthdate()?
            .map_or(-1, |birthdate| age_on(birthdate, today)))
    }

    fn writer(&self) -> Result<&Arc<dyn AttributeWriter>> {
        self.writer.as_ref().ok_or_else(|| {
            Error::InvalidRequest("member view is not attached to a directory client".to_string())
        })
    }

    fn require_uid(&self) -> Result<String> {
        self.uid()
            .map(str::to_owned)
            .ok_or_else(|| Error::InvalidRequest("member view has no uid".to_string()))
    }

    /// Writes one attribute to the directory, then to the local map.
    ///
    /// The derived `groups` and `committee` attributes are never written and stay unchanged.
    ///
    /// # Errors
    ///
    /// Returns the directory's error, leaving the local value untouched, or
    /// [`Error::InvalidRequest`] if the view has no writer or no uid.
    pub async fn set(&mut self, name: &str, value: impl ToString) -> Result<()> {
        if name == GROUPS_ATTRIBUTE || name == COMMITTEE_ATTRIBUTE {
            debug!(attribute = name, "derived attribute is not written");
            return Ok(());
        }
        let writer = self.writer()?.clone();
        let uid = self.require_uid()?;
        let value = value.to_string();

        writer
            .write_attributes(&uid, vec![(name.to_string(), value.clone())])
            .await?;
        self.attributes.insert(name.to_string(), vec![value]);
        Ok(())
    }

    /// Replaces the local attributes with a fresh copy from the directory.
    ///
    /// Does nothing when the view is not attached to a client.
    ///
    /// # Errors
    ///
    /// Returns the directory's error, or [`Error::InvalidRequest`] if the member no longer
    /// exists or the view has no uid.
    pub async fn reload(&mut self) -> Result<()> {
        let Some(writer) = self.writer.clone() else {
            return Ok(());
        };
        let uid = self.require_uid()?;
        let attributes = writer
            .fetch_attributes(&uid)
            .await?
            .ok_or_else(|| Error::InvalidRequest(format!("member `{uid}` no longer exists")))?;
        self.attributes = attributes;
        Ok(())
    }
}

impl FromDirectoryEntry for Member {
    fn from_entry(entry: LdapEntry, client: &DirectoryClient) -> Self {
        Self::from_ldap_entry(entry).with_writer(Arc::new(client.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        Writer {}

        #[async_trait]
        impl AttributeWriter for Writer {
            async fn write_attributes(&self, uid: &str, changes: Vec<(String, String)>) -> Result<()>;
            async fn fetch_attributes(&self, uid: &str) -> Result<Option<Attributes>>;
        }
    }

    fn attributes(pairs: &[(&str, &[&str])]) -> Attributes {
        pairs
            .iter()
            .map(|(name, values)| {
                (
                    (*name).to_string(),
                    values.iter().map(|value| (*value).to_string()).collect(),
                )
            })
            .collect()
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn jdoe() -> Member {
        Member::from_ldap_entry(LdapEntry::new(
            "uid=jdoe,ou=Users,dc=csh,dc=rit,dc=edu",
            attributes(&[
                ("uid", &["jdoe"]),
                ("cn", &["John Doe"]),
                ("active", &["1"]),
                ("alumni", &["0"]),
                ("onfloor", &["1"]),
                ("roomNumber", &["3013"]),
                ("birthday", &["19900315000000Z"]),
                ("memberSince", &["20080825040000Z"]),
                ("mail", &["jdoe@csh.rit.edu", "john@example.com"]),
                ("groups", &["eboard", "rtp"]),
                ("committee", &["Financial"]),
            ]),
        ))
    }

    #[test]
    fn coerced_reads() {
        let member = jdoe();
        assert_eq!(member.get("roomNumber"), Some(AttributeValue::Integer(3013)));
        assert_eq!(
            member.attribute(KnownAttribute::Cn),
            Some(AttributeValue::Text("John Doe".to_string()))
        );
        assert_eq!(
            member.get("mail"),
            Some(AttributeValue::Values(vec![
                "jdoe@csh.rit.edu".to_string(),
                "john@example.com".to_string()
            ]))
        );
        assert_eq!(member.get("loginShell"), None);
        assert_eq!(member.dn(), Some("uid=jdoe,ou=Users,dc=csh,dc=rit,dc=edu"));
        assert!(member.fields().contains("memberSince"));
    }

    #[test]
    fn predicates() {
        let member = jdoe();
        assert!(member.is_active());
        assert!(!member.is_alumni());
        assert!(member.is_on_floor());
        assert!(!member.is_drink_admin());
        assert!(member.is_eboard());
        assert!(member.is_rtp());
        assert_eq!(member.committee(), Some("Financial"));

        let bare = Member::new(attributes(&[("uid", &["bare"])]));
        assert!(!bare.is_active());
        assert!(!bare.is_eboard());
        assert!(bare.groups().is_empty());
    }

    #[test]
    fn textual_flags_are_truthy_when_non_empty() {
        let flagged = Member::new(attributes(&[
            ("active", &["FALSE"]),
            ("onfloor", &["TRUE"]),
            ("alumni", &[""]),
        ]));
        assert!(flagged.is_active());
        assert!(flagged.is_on_floor());
        assert!(!flagged.is_alumni());
    }

    #[test]
    fn dates() {
        let member = jdoe();
        assert_eq!(member.birthdate().unwrap(), Some(date(1990, 3, 15)));
        assert_eq!(member.joindate().unwrap(), Some(date(2008, 8, 25)));
        assert_eq!(member.age_on(date(2024, 3, 10)).unwrap(), 33);
        assert_eq!(member.age_on(date(2024, 3, 20)).unwrap(), 34);
        assert!(member.is_birthday_on(date(2031, 3, 15)).unwrap());
        assert!(!member.is_birthday_on(date(2031, 3, 16)).unwrap());
    }

    #[test]
    fn missing_birthday_is_unknown_age() {
        let member = Member::new(attributes(&[("uid", &["nobday"])]));
        assert_eq!(member.birthdate().unwrap(), None);
        assert_eq!(member.age().unwrap(), -1);
        assert!(!member.is_birthday().unwrap());
    }

    #[test]
    fn malformed_birthday_is_an_error() {
        let member = Member::new(attributes(&[("birthday", &["yesterday-ish"])]));
        assert!(matches!(member.age(), Err(Error::InvalidTimestamp(_))));
    }

    #[tokio::test]
    async fn set_writes_through_then_updates_locally() {
        let mut writer = MockWriter::new();
        writer
            .expect_write_attributes()
            .withf(|uid, changes| {
                uid == "jdoe" && *changes == vec![("roomNumber".to_string(), "3020".to_string())]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut member = jdoe().with_writer(Arc::new(writer));
        member.set("roomNumber", 3020).await.unwrap();
        assert_eq!(member.get("roomNumber"), Some(AttributeValue::Integer(3020)));
    }

    #[tokio::test]
    async fn failed_write_leaves_local_value() {
        let mut writer = MockWriter::new();
        writer
            .expect_write_attributes()
            .returning(|_, _| Err(Error::ldap("insufficientAccessRights")));

        let mut member = jdoe().with_writer(Arc::new(writer));
        let err = member.set("roomNumber", 3020).await.unwrap_err();
        assert_eq!(err, Error::ldap("insufficientAccessRights"));
        assert_eq!(member.get("roomNumber"), Some(AttributeValue::Integer(3013)));
    }

    #[tokio::test]
    async fn derived_attributes_are_left_alone() {
        let mut writer = MockWriter::new();
        writer.expect_write_attributes().never();

        let mut member = jdoe().with_writer(Arc::new(writer));
        member.set("groups", "drink").await.unwrap();
        member.set("committee", "Social").await.unwrap();
        assert!(member.is_eboard());
        assert!(!member.is_drink_admin());
        assert_eq!(member.committee(), Some("Financial"));
    }

    #[tokio::test]
    async fn set_without_writer_fails() {
        let mut member = jdoe();
        let err = member.set("roomNumber", 1).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn reload_replaces_attributes() {
        let mut writer = MockWriter::new();
        writer
            .expect_fetch_attributes()
            .withf(|uid| uid == "jdoe")
            .returning(|_| Ok(Some(attributes(&[("uid", &["jdoe"]), ("active", &["0"])]))));

        let mut member = jdoe().with_writer(Arc::new(writer));
        member.reload().await.unwrap();
        assert!(!member.is_active());
        assert_eq!(member.fields().len(), 2);
    }

    #[tokio::test]
    async fn reload_without_writer_is_noop() {
        let mut member = jdoe();
        member.reload().await.unwrap();
        assert!(member.is_active());
    }
}
