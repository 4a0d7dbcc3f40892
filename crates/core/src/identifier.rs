//! Site identifiers and the public URLs derived from them.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{GENERATED_IDENTIFIER_LEN, MAX_IDENTIFIER_LEN, MIN_IDENTIFIER_LEN};

/// A site identifier: the subdomain label a site is served under.
///
/// Identifiers double as the site's directory name under the sites root,
/// so the accepted alphabet is deliberately narrow: lowercase ASCII letters,
/// digits and inner hyphens.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SiteIdentifier(String);

impl SiteIdentifier {
    /// Parse a user-supplied identifier, validating its format.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let len = s.len();
        if !(MIN_IDENTIFIER_LEN..=MAX_IDENTIFIER_LEN).contains(&len) {
            return Err(crate::Error::InvalidIdentifier(format!(
                "identifier must be {MIN_IDENTIFIER_LEN}-{MAX_IDENTIFIER_LEN} chars, got {len}"
            )));
        }

        for c in s.chars() {
            if !matches!(c, 'a'..='z' | '0'..='9' | '-') {
                return Err(crate::Error::InvalidIdentifier(format!(
                    "invalid character in identifier: {c:?}"
                )));
            }
        }

        if s.starts_with('-') || s.ends_with('-') {
            return Err(crate::Error::InvalidIdentifier(
                "identifier cannot start or end with '-'".to_string(),
            ));
        }

        Ok(Self(s.to_string()))
    }

    /// Draw a fresh random identifier of lowercase letters.
    ///
    /// Uniqueness is not checked here; the caller owns collision handling.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let s: String = (0..GENERATED_IDENTIFIER_LEN)
            .map(|_| char::from(rng.random_range(b'a'..=b'z')))
            .collect();
        Self(s)
    }

    /// Get the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for SiteIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SiteIdentifier({})", self.0)
    }
}

impl fmt::Display for SiteIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SiteIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SiteIdentifier {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<SiteIdentifier> for String {
    fn from(value: SiteIdentifier) -> Self {
        value.0
    }
}

/// Public URL a site is served at.
pub fn site_url(identifier: &str, base_domain: &str) -> String {
    format!("https://{identifier}.{base_domain}")
}
