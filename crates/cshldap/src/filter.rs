//! Translation of attribute/value terms into LDAP search requests.

use crate::client::SearchScope;

/// Filter matching every entry; used for base-object lookups and term-less searches.
const MATCH_ALL: &str = "(objectClass=*)";

/// Attribute name that turns a search into a base-object lookup of the given DN.
const DN_TERM: &str = "dn";

/// A search expressed as an optional base plus ordered equality terms.
///
/// ```
/// use cshldap::SearchQuery;
///
/// let target = SearchQuery::new()
///     .term("uid", "jdoe")
///     .term("active", "1")
///     .resolve("ou=Users,dc=csh,dc=rit,dc=edu");
/// assert_eq!(target.filter, "(&(uid=jdoe)(active=1))");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    base: Option<String>,
    terms: Vec<(String, String)>,
}

/// Fully resolved search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    /// Search base DN.
    pub base: String,
    /// Search scope.
    pub scope: SearchScope,
    /// LDAP filter expression.
    pub filter: String,
}

impl SearchQuery {
    /// Creates an empty query against the default search base.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Searches under `base` instead of the configured default.
    #[must_use]
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Adds an `(attribute=value)` term. `*` in the value matches anything.
    ///
    /// A `dn` term makes the query a base-object lookup of that DN and every other term is
    /// ignored.
    #[must_use]
    pub fn term(mut self, attribute: impl Into<String>, value: impl ToString) -> Self {
        self.terms.push((attribute.into(), value.to_string()));
        self
    }

    /// Resolves the base, scope and filter string, using `default_base` when no base was set.
    #[must_use]
    pub fn resolve(&self, default_base: &str) -> SearchTarget {
        if let Some((_, dn)) = self
            .terms
            .iter()
            .find(|(attribute, _)| attribute.eq_ignore_ascii_case(DN_TERM))
        {
            return SearchTarget {
                base: dn.clone(),
                scope: SearchScope::Base,
                filter: MATCH_ALL.to_string(),
            };
        }

        let base = self
            .base
            .clone()
            .unwrap_or_else(|| default_base.to_string());
        let filter = match self.terms.as_slice() {
            [] => MATCH_ALL.to_string(),
            [(attribute, value)] => equality(attribute, value),
            terms => {
                let joined: String = terms
                    .iter()
                    .map(|(attribute, value)| equality(attribute, value))
                    .collect();
                format!("(&{joined})")
            }
        };

        SearchTarget {
            base,
            scope: SearchScope::Subtree,
            filter,
        }
    }
}

fn equality(attribute: &str, value: &str) -> String {
    format!("({attribute}={})", escape_filter_value(value))
}

/// Escapes filter metacharacters except `*`, which stays a wildcard.
fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
