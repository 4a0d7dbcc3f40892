//! Token scopes and the caller identity a token confers.
//!
//! A token either acts for one user or, for the bootstrap admin token, for
//! nobody in particular. What it may touch follows from that owner and its
//! scopes, summarized as an [`Actor`].

use std::collections::HashSet;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Token scopes for authorization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenScope {
    /// List and inspect own sites.
    SitesRead,
    /// Upload, rename and delete own sites.
    SitesWrite,
    /// Manage every site, users and tokens.
    SitesAdmin,
}

impl TokenScope {
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "sites:read" => Ok(Self::SitesRead),
            "sites:write" => Ok(Self::SitesWrite),
            "sites:admin" => Ok(Self::SitesAdmin),
            _ => Err(crate::Error::InvalidToken(format!("unknown scope: {s}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SitesRead => "sites:read",
            Self::SitesWrite => "sites:write",
            Self::SitesAdmin => "sites:admin",
        }
    }

    /// Admin implies everything, write implies read.
    pub fn implies(&self, other: &Self) -> bool {
        match self {
            Self::SitesAdmin => true,
            Self::SitesWrite => matches!(other, Self::SitesWrite | Self::SitesRead),
            Self::SitesRead => matches!(other, Self::SitesRead),
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bearer token after lookup, reduced to what authorization needs.
#[derive(Clone, Debug)]
pub struct Token {
    pub id: Uuid,
    /// User this token acts for. `None` for the bootstrap admin token.
    pub user_id: Option<i64>,
    pub scopes: HashSet<TokenScope>,
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
}

impl Token {
    /// Neither revoked nor past its expiry at `now`.
    pub fn is_usable_at(&self, now: OffsetDateTime) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|expires_at| now <= expires_at)
    }

    pub fn has_scope(&self, scope: TokenScope) -> bool {
        self.scopes.iter().any(|s| s.implies(&scope))
    }

    /// The identity this token acts under on sites.
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            is_admin: self.has_scope(TokenScope::SitesAdmin),
        }
    }
}

/// Who is acting on a site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    /// `None` for the bootstrap admin token.
    pub user_id: Option<i64>,
    pub is_admin: bool,
}

impl Actor {
    /// Admins manage every site; everyone else only the sites they own.
    /// Unowned sites are admin-only.
    pub fn may_manage(&self, owner_id: Option<i64>) -> bool {
        self.is_admin || (self.user_id.is_some() && owner_id == self.user_id)
    }
}
