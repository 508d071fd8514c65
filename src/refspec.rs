//! Refspec grammar: parsing, glob pattern matching, and application.
//!
//! Parsing follows `parse_refspec_internal` in git's `remote.c`: a leading
//! `+` marks a forced update, a leading `^` marks a negative (exclusion)
//! refspec, then `<src>[:<dst>]`. A single `*` on a side makes it a glob
//! pattern; both sides must agree on having one, or neither.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidRefspec {
    #[error("more than one '*' in refspec component")]
    MultipleWildcards,
    #[error("only one side of the refspec has a '*'")]
    UnbalancedWildcard,
    #[error("destination may not start with '+'")]
    DstStartsWithForce,
    #[error("negative refspec may not have a destination")]
    NegativeWithDst,
    #[error("destination is required in a fetch refspec")]
    MissingDst,
    #[error("empty refspec")]
    Empty,
}

/// A parsed `[+][^]<src>[:<dst>]` mapping between a remote and a local
/// reference namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefspecItem {
    pub force: bool,
    pub matching: bool,
    pub pattern: bool,
    pub exact_oid: bool,
    pub negative: bool,
    pub src: Option<Box<str>>,
    pub dst: Option<Box<str>>,
}

fn is_hex_oid(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn count_wildcards(s: &str) -> usize {
    s.bytes().filter(|&b| b == b'*').count()
}

impl RefspecItem {
    /// Parses one refspec string. `fetch` selects fetch-context validation
    /// (a destination is mandatory for anything but an exact-oid source);
    /// push-context validation is looser (allows empty src for deletes,
    /// and a lone `:` matching refspec).
    pub fn parse(input: &str, fetch: bool) -> Result<Self, InvalidRefspec> {
        let mut rest = input;
        if rest.is_empty() {
            return Err(InvalidRefspec::Empty);
        }

        let force = rest.starts_with('+');
        if force {
            rest = &rest[1..];
        }

        let negative = rest.starts_with('^');
        if negative {
            rest = &rest[1..];
        }

        // A lone ':' (after stripping '+'/'^') is the push-only matching
        // refspec: matches all branches by name on both sides.
        if rest == ":" {
            if negative {
                return Err(InvalidRefspec::NegativeWithDst);
            }
            return Ok(Self {
                force,
                matching: true,
                pattern: false,
                exact_oid: false,
                negative: false,
                src: None,
                dst: None,
            });
        }

        let (lhs, rhs) = match rest.rfind(':') {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
            None => (rest, None),
        };

        if negative && rhs.is_some() {
            return Err(InvalidRefspec::NegativeWithDst);
        }

        if let Some(dst) = rhs {
            if dst.starts_with('+') {
                return Err(InvalidRefspec::DstStartsWithForce);
            }
        }

        let lhs_stars = count_wildcards(lhs);
        if lhs_stars > 1 {
            return Err(InvalidRefspec::MultipleWildcards);
        }
        let rhs_stars = rhs.map(count_wildcards).unwrap_or(0);
        if rhs_stars > 1 {
            return Err(InvalidRefspec::MultipleWildcards);
        }

        // If a destination was given, both sides must agree on having a
        // wildcard or neither; an absent destination has nothing to
        // balance against.
        if rhs.is_some() && (lhs_stars == 1) != (rhs_stars == 1) {
            return Err(InvalidRefspec::UnbalancedWildcard);
        }
        let pattern = lhs_stars == 1 || rhs_stars == 1;

        let exact_oid = rhs.is_none() && !pattern && !lhs.is_empty() && is_hex_oid(lhs);

        if fetch && rhs.is_none() && !exact_oid && !lhs.is_empty() {
            return Err(InvalidRefspec::MissingDst);
        }

        let src = if lhs.is_empty() { None } else { Some(lhs.into()) };
        let dst = rhs.and_then(|d| if d.is_empty() { None } else { Some(d.into()) });

        Ok(Self {
            force,
            matching: false,
            pattern,
            exact_oid,
            negative,
            src,
            dst,
        })
    }
}

/// Splits a glob pattern `P*S` into its prefix and suffix. Returns `None`
/// if the pattern has no `*` (callers should use plain equality then).
fn split_pattern(pattern: &str) -> Option<(&str, &str)> {
    pattern.find('*').map(|idx| (&pattern[..idx], &pattern[idx + 1..]))
}

/// Matches `name` against glob pattern `key`, returning the captured
/// middle segment on success.
pub fn match_name_with_pattern<'n>(key: &str, name: &'n str) -> Option<&'n str> {
    let (prefix, suffix) = split_pattern(key)?;
    if name.len() < prefix.len() + suffix.len() {
        return None;
    }
    if !name.starts_with(prefix) || !name.ends_with(suffix) {
        return None;
    }
    Some(&name[prefix.len()..name.len() - suffix.len()])
}

/// Substitutes a captured middle segment into a value-side pattern
/// `P*S`, producing `P<middle>S`.
pub fn expand_pattern(value_pattern: &str, middle: &str) -> String {
    match split_pattern(value_pattern) {
        Some((prefix, suffix)) => format!("{prefix}{middle}{suffix}"),
        None => value_pattern.to_owned(),
    }
}

/// Applies one refspec's `src` pattern/literal to `name`, returning the
/// mapped destination name if it matches. Patternless refspecs require
/// exact equality.
fn apply_one(item: &RefspecItem, name: &str) -> Option<String> {
    let src = item.src.as_deref()?;
    if item.pattern {
        let middle = match_name_with_pattern(src, name)?;
        let dst = item.dst.as_deref().unwrap_or("");
        Some(expand_pattern(dst, middle))
    } else if src == name {
        Some(item.dst.as_deref().unwrap_or(name).to_owned())
    } else {
        None
    }
}

/// Tries each refspec in order, first match wins. Exact and pattern
/// entries coexist with no priority between them.
pub fn apply_refspecs(refspecs: &[RefspecItem], name: &str) -> Option<String> {
    apply_refspecs_detailed(refspecs, name).map(|(dst, _)| dst)
}

/// Like [`apply_refspecs`], but also returns whether the matching
/// refspec was a forced one.
pub fn apply_refspecs_detailed(refspecs: &[RefspecItem], name: &str) -> Option<(String, bool)> {
    refspecs
        .iter()
        .filter(|r| !r.negative && !r.matching)
        .find_map(|r| apply_one(r, name).map(|dst| (dst, r.force)))
}

/// Returns true if `name` matches the source side of any negative
/// refspec in the list.
pub fn matches_negative(refspecs: &[RefspecItem], name: &str) -> bool {
    refspecs.iter().filter(|r| r.negative).any(|r| {
        let Some(src) = r.src.as_deref() else {
            return false;
        };
        if r.pattern {
            match_name_with_pattern(src, name).is_some()
        } else {
            src == name
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_plain_fetch_refspec() {
        let r = RefspecItem::parse("refs/heads/*:refs/remotes/origin/*", true).unwrap();
        assert!(!r.force);
        assert!(r.pattern);
        assert_eq!(r.src.as_deref(), Some("refs/heads/*"));
        assert_eq!(r.dst.as_deref(), Some("refs/remotes/origin/*"));
    }

    #[test]
    fn parses_forced_refspec() {
        let r = RefspecItem::parse("+refs/heads/*:refs/remotes/origin/*", true).unwrap();
        assert!(r.force);
    }

    #[test]
    fn parses_negative_refspec() {
        let r = RefspecItem::parse("^refs/heads/wip", true).unwrap();
        assert!(r.negative);
        assert_eq!(r.src.as_deref(), Some("refs/heads/wip"));
        assert!(r.dst.is_none());
    }

    #[test]
    fn negative_with_dst_rejected() {
        assert_eq!(
            RefspecItem::parse("^refs/heads/wip:refs/x", true).unwrap_err(),
            InvalidRefspec::NegativeWithDst
        );
    }

    #[test]
    fn missing_dst_in_fetch_context_rejected() {
        assert_eq!(
            RefspecItem::parse("refs/heads/main", true).unwrap_err(),
            InvalidRefspec::MissingDst
        );
    }

    #[test]
    fn exact_oid_without_dst_accepted() {
        let hex = "94f2d13eff5ba32ea0ab1c0c2fd1b73d24a9f2b3";
        let r = RefspecItem::parse(hex, true).unwrap();
        assert!(r.exact_oid);
        assert_eq!(r.src.as_deref(), Some(hex));
    }

    #[test]
    fn unbalanced_wildcard_rejected() {
        assert_eq!(
            RefspecItem::parse("refs/heads/*:refs/remotes/origin/main", true).unwrap_err(),
            InvalidRefspec::UnbalancedWildcard
        );
    }

    #[test]
    fn dst_starting_with_plus_rejected() {
        assert_eq!(
            RefspecItem::parse("refs/heads/main:+refs/x", true).unwrap_err(),
            InvalidRefspec::DstStartsWithForce
        );
    }

    #[test]
    fn lone_colon_is_matching_refspec() {
        let r = RefspecItem::parse(":", false).unwrap();
        assert!(r.matching);
        assert!(r.src.is_none());
        assert!(r.dst.is_none());
    }

    #[test]
    fn pattern_match_captures_middle() {
        assert_eq!(
            match_name_with_pattern("refs/heads/*", "refs/heads/main"),
            Some("main")
        );
        assert_eq!(match_name_with_pattern("refs/heads/*", "refs/tags/v1"), None);
    }

    #[test]
    fn apply_refspecs_first_match_wins() {
        let specs = vec![
            RefspecItem::parse("refs/heads/main:refs/remotes/origin/stable", true).unwrap(),
            RefspecItem::parse("refs/heads/*:refs/remotes/origin/*", true).unwrap(),
        ];
        assert_eq!(
            apply_refspecs(&specs, "refs/heads/main").as_deref(),
            Some("refs/remotes/origin/stable")
        );
    }

    #[test]
    fn negative_matches_source_by_pattern() {
        let specs = vec![RefspecItem::parse("^refs/tags/*", true).unwrap()];
        assert!(matches_negative(&specs, "refs/tags/v1"));
        assert!(!matches_negative(&specs, "refs/heads/main"));
    }

    fn ascii(bytes: &[u8]) -> String {
        bytes.iter().map(|b| (b'a' + (b % 5)) as char).collect()
    }

    #[qcheck_macros::quickcheck]
    fn prop_expand_then_match_recovers_middle(prefix: Vec<u8>, suffix: Vec<u8>, middle: Vec<u8>) -> bool {
        let (prefix, suffix, middle) = (ascii(&prefix), ascii(&suffix), ascii(&middle));
        let key = format!("{prefix}*{suffix}");
        let expanded = expand_pattern(&key, &middle);
        match_name_with_pattern(&key, &expanded) == Some(middle.as_str())
    }
}
