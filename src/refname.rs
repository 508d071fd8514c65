//! Reference names.

use std::fmt;

pub const HEAD: &str = "HEAD";
pub const REFS_HEADS: &str = "refs/heads/";
pub const REFS_TAGS: &str = "refs/tags/";
pub const REFS_REMOTES: &str = "refs/remotes/";
pub const REFS_PREFETCH: &str = "refs/prefetch/";

/// A `/`-delimited reference path, e.g. `refs/heads/main` or the bare
/// symbolic name `HEAD`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefName(Box<str>);

impl RefName {
    pub fn new(s: impl Into<Box<str>>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A name is "qualified" iff it starts with `refs/`.
    pub fn is_qualified(&self) -> bool {
        self.0.starts_with("refs/")
    }

    pub fn is_head(&self) -> bool {
        self.0.as_ref() == HEAD
    }

    pub fn is_tag(&self) -> bool {
        self.0.starts_with(REFS_TAGS)
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with(REFS_HEADS)
    }

    pub fn is_remote_tracking(&self) -> bool {
        self.0.starts_with(REFS_REMOTES)
    }

    pub fn is_prefetch(&self) -> bool {
        self.0.starts_with(REFS_PREFETCH)
    }

    /// The part of the name after any leading `refs/`, used when
    /// rewriting destinations under `refs/prefetch/<sub>`.
    pub fn strip_refs_prefix(&self) -> &str {
        self.0.strip_prefix("refs/").unwrap_or(&self.0)
    }

    /// Naming used for FETCH_HEAD/`[new ...]` display: the human kind of
    /// ref this is, derived from its prefix.
    pub fn kind_label(&self) -> RefKind {
        if self.is_tag() {
            RefKind::Tag
        } else if self.is_branch() {
            RefKind::Branch
        } else {
            RefKind::Other
        }
    }

    pub fn short_name(&self) -> &str {
        self.0
            .strip_prefix(REFS_HEADS)
            .or_else(|| self.0.strip_prefix(REFS_TAGS))
            .or_else(|| self.0.strip_prefix(REFS_REMOTES))
            .unwrap_or(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Branch,
    Tag,
    Other,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefKind::Branch => "branch",
            RefKind::Tag => "tag",
            RefKind::Other => "ref",
        })
    }
}

impl fmt::Debug for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefName({})", self.0)
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RefName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RefName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn qualification() {
        assert!(RefName::new("refs/heads/main").is_qualified());
        assert!(!RefName::new(HEAD).is_qualified());
    }

    #[test]
    fn kind_label_by_prefix() {
        assert_eq!(RefName::new("refs/tags/v1").kind_label(), RefKind::Tag);
        assert_eq!(RefName::new("refs/heads/main").kind_label(), RefKind::Branch);
        assert_eq!(
            RefName::new("refs/remotes/origin/main").kind_label(),
            RefKind::Other
        );
    }

    #[test]
    fn strip_refs_prefix_for_prefetch_rewrite() {
        assert_eq!(
            RefName::new("refs/heads/main").strip_refs_prefix(),
            "heads/main"
        );
    }

    #[test]
    fn short_name_strips_known_namespaces() {
        assert_eq!(RefName::new("refs/heads/main").short_name(), "main");
        assert_eq!(RefName::new("refs/tags/v1").short_name(), "v1");
    }
}
