//! Distinguished name handling for member, group and committee entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use cshldap_core::Error as CoreError;

/// Errors produced while parsing a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component was not of the form `attribute=value`.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::InvalidRequest(err.to_string())
    }
}

/// One `attribute=value` pair of a relative distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct AttributeAssertion {
    attribute: String,
    value: String,
}

/// Parsed distinguished name such as `uid=jdoe,ou=Users,dc=csh,dc=rit,dc=edu`.
///
/// Each outer element is one RDN; multi-valued RDNs (`cn=a+uid=b`) hold several assertions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistinguishedName {
    rdns: Vec<Vec<AttributeAssertion>>,
}

impl DistinguishedName {
    /// Parses a distinguished name.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] for empty input, components without `=`, empty
    /// attributes or values, and dangling escapes.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let mut rdns = Vec::new();
        let mut rdn = Vec::new();
        let mut attribute: Option<String> = None;
        let mut current = String::new();
        let mut chars = raw.chars();

        while let Some(ch) = chars.next() {
            match ch {
                '\\' => {
                    let escaped = chars
                        .next()
                        .ok_or(DistinguishedNameError::UnterminatedEscape)?;
                    current.push(escaped);
                }
                '=' if attribute.is_none() => {
                    attribute = Some(std::mem::take(&mut current));
                }
                ',' | '+' => {
                    rdn.push(finish_assertion(attribute.take(), &mut current, raw)?);
                    if ch == ',' {
                        rdns.push(std::mem::take(&mut rdn));
                    }
                }
                _ => current.push(ch),
            }
        }
        rdn.push(finish_assertion(attribute, &mut current, raw)?);
        rdns.push(rdn);

        Ok(Self { rdns })
    }

    /// Builds the DN of a direct child, e.g. `uid=<value>` under `ou=Users,...`.
    #[must_use]
    pub fn child(&self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(vec![AttributeAssertion {
            attribute: attribute.into(),
            value: value.into(),
        }]);
        rdns.extend(self.rdns.iter().cloned());
        Self { rdns }
    }

    fn normalized(&self) -> String {
        self.to_string().to_ascii_lowercase()
    }
}

fn finish_assertion(
    attribute: Option<String>,
    current: &mut String,
    raw: &str,
) -> Result<AttributeAssertion, DistinguishedNameError> {
    let value = std::mem::take(current);
    let attribute = attribute
        .map(|attribute| attribute.trim().to_string())
        .filter(|attribute| !attribute.is_empty())
        .ok_or_else(|| DistinguishedNameError::InvalidComponent(raw.to_string()))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(DistinguishedNameError::InvalidComponent(raw.to_string()));
    }
    Ok(AttributeAssertion {
        attribute,
        value: value.to_string(),
    })
}

fn escape_value(value: &str, out: &mut String) {
    let last = value.chars().count().saturating_sub(1);
    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && matches!(ch, ' ' | '#'))
            || (idx == last && ch == ' ');
        if needs_escape {
            out.push('\\');
        }
        out.push(ch);
    }
}

impl PartialEq for DistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for DistinguishedName {}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            for (j, assertion) in rdn.iter().enumerate() {
                if j > 0 {
                    out.push('+');
                }
                out.push_str(&assertion.attribute);
                out.push('=');
                escape_value(&assertion.value, &mut out);
            }
        }
        f.write_str(&out)
    }
}
