use serde::Serialize;
use std::fmt;

/// Why an archive (or one of its entries) was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    MalformedArchive,
    PayloadTooLarge,
    TooManyEntries,
    PathTraversal,
    PathTooDeep,
    DisallowedType,
    FileTooLarge,
    NoEntryPoint,
}

impl RejectionKind {
    /// Stable machine-readable code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedArchive => "malformed_archive",
            Self::PayloadTooLarge => "payload_too_large",
            Self::TooManyEntries => "too_many_entries",
            Self::PathTraversal => "path_traversal",
            Self::PathTooDeep => "path_too_deep",
            Self::DisallowedType => "disallowed_type",
            Self::FileTooLarge => "file_too_large",
            Self::NoEntryPoint => "no_entry_point",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single offending entry, or the archive as a whole when `entry` is `None`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    pub reason: String,
}

impl Rejection {
    pub(crate) fn archive(kind: RejectionKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            entry: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn entry(kind: RejectionKind, entry: &str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            entry: Some(entry.to_string()),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entry {
            Some(entry) => write!(f, "{}: '{}': {}", self.kind, entry, self.reason),
            None => write!(f, "{}: {}", self.kind, self.reason),
        }
    }
}

/// Every reason an archive was refused, gathered in one pass.
#[derive(Debug, thiserror::Error)]
#[error("archive rejected: {}", summarize(.rejections))]
pub struct ValidationError {
    pub rejections: Vec<Rejection>,
}

fn summarize(rejections: &[Rejection]) -> String {
    match rejections {
        [] => "no reason given".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

impl ValidationError {
    pub(crate) fn single(rejection: Rejection) -> Self {
        Self {
            rejections: vec![rejection],
        }
    }

    /// Whole-archive rejection raised outside the validator, e.g. by an
    /// upload front end checking the declared filename.
    pub fn rejected(kind: RejectionKind, reason: impl Into<String>) -> Self {
        Self::single(Rejection::archive(kind, reason))
    }

    /// Category of the first rejection; used when only one code can be reported.
    pub fn primary_kind(&self) -> RejectionKind {
        self.rejections
            .first()
            .map(|r| r.kind)
            .unwrap_or(RejectionKind::MalformedArchive)
    }

    /// True if any rejection has the given kind.
    pub fn has(&self, kind: RejectionKind) -> bool {
        self.rejections.iter().any(|r| r.kind == kind)
    }
}
