//! Ref map builder: turns a remote's advertisement plus the effective
//! refspecs and tag policy into the ordered list of ref updates the
//! orchestrator will classify and apply.
//!
//! Grounded on `get_ref_map` in `builtin/fetch.c` and `query_refspecs`/
//! `query_refspecs_multiple` in `remote.c`.

use crate::oid::ObjectId;
use crate::refname::RefName;
use crate::refspec::{apply_refspecs_detailed, matches_negative, RefspecItem};
use crate::remote::TagPolicy;

/// Ordering matters: FETCH_HEAD is written in three passes, one per
/// variant, in this declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FetchHeadStatus {
    Merge,
    NotForMerge,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefStatus {
    None,
    UpToDate,
    Ok,
    RejectNonFastForward,
    RejectStale,
    RejectAlreadyExists,
    RejectFetchFirst,
    RejectNeedsForce,
    RejectShallow,
    TagUpdate,
    NewRef,
    FastForward,
    ForcedUpdate,
}

/// One entry in a ref map.
///
/// `name` is the local destination the orchestrator updates; `source_name`
/// is the remote-advertised name it was mapped from (kept alongside, since
/// FETCH_HEAD notes and tag auto-follow both need the remote-side name
/// after mapping has happened). `peer_ref` is a non-owning index into the
/// same ref map, used by tag auto-follow to link a lightweight tag entry
/// to the entry for its peeled target commit, when that commit is itself
/// part of this fetch.
#[derive(Debug, Clone)]
pub struct Ref {
    pub name: RefName,
    pub source_name: RefName,
    pub old_oid: ObjectId,
    pub new_oid: ObjectId,
    pub symref: Option<RefName>,
    pub peer_ref: Option<usize>,
    pub force: bool,
    pub status: RefStatus,
    pub fetch_head_status: FetchHeadStatus,
}

/// One entry of the remote's advertisement.
#[derive(Debug, Clone)]
pub struct AdvertisedRef {
    pub name: RefName,
    pub oid: ObjectId,
    pub symref: Option<RefName>,
    /// For annotated tags, the commit/object the tag points at, if the
    /// server peeled it in the advertisement (`<name>^{}`).
    pub peeled: Option<ObjectId>,
}

const PREFETCH_PREFIX: &str = "refs/prefetch/";

fn rewrite_for_prefetch(refspecs: &[RefspecItem]) -> Vec<RefspecItem> {
    refspecs
        .iter()
        .filter(|r| !r.negative)
        .filter_map(|r| {
            let src = r.src.as_deref()?;
            let dst = r.dst.as_deref()?;
            if src.starts_with("refs/tags/") {
                return None;
            }
            let sub = dst.strip_prefix("refs/").unwrap_or(dst);
            let new_dst = format!("{PREFETCH_PREFIX}{sub}");
            Some(RefspecItem {
                force: true,
                matching: r.matching,
                pattern: r.pattern,
                exact_oid: r.exact_oid,
                negative: false,
                src: Some(src.into()),
                dst: Some(new_dst.into_boxed_str()),
            })
        })
        .collect()
}

/// Builds the ref map between advertised remote refs and refspecs.
/// `local_ref_oid` resolves the
/// current value of a local ref, if any; `local_has_object` reports
/// whether an object is already physically present, used by tag
/// auto-follow to decide whether a lightweight tag's target is already
/// satisfied.
pub fn build_ref_map(
    advertised: &[AdvertisedRef],
    refspecs: &[RefspecItem],
    tag_policy: TagPolicy,
    prefetch: bool,
    local_ref_oid: impl Fn(&str) -> Option<ObjectId>,
    local_has_object: impl Fn(&ObjectId) -> bool,
) -> Vec<Ref> {
    let negatives: Vec<RefspecItem> = refspecs.iter().filter(|r| r.negative).cloned().collect();

    let positives: Vec<RefspecItem> = if prefetch {
        rewrite_for_prefetch(refspecs)
    } else {
        refspecs
            .iter()
            .filter(|r| !r.negative && !r.matching)
            .cloned()
            .collect()
    };

    // Step 4: fall back to HEAD if no refspecs apply at all.
    let positives: Vec<RefspecItem> = if positives.is_empty() {
        vec![RefspecItem {
            force: false,
            matching: false,
            pattern: false,
            exact_oid: false,
            negative: false,
            src: Some("HEAD".into()),
            dst: Some("HEAD".into()),
        }]
    } else {
        positives
    };

    // A ref is the merge candidate only when it is produced by a single,
    // non-pattern refspec (the literal "fetch exactly this ref" shape,
    // including the synthetic HEAD fallback above); every destination a
    // pattern refspec or a secondary refspec produces is not-for-merge,
    // matching `get_ref_map`'s default `struct ref` status of
    // `FETCH_HEAD_NOT_FOR_MERGE` with `FETCH_HEAD_MERGE` reserved for
    // that one case.
    let merge_src: Option<&str> = positives
        .first()
        .filter(|r| !r.pattern)
        .and_then(|r| r.src.as_deref());

    let mut refs = Vec::new();
    let mut mapped_dsts = std::collections::HashSet::new();

    for adv in advertised {
        let Some((dst, force)) = apply_refspecs_detailed(&positives, adv.name.as_str()) else {
            continue;
        };
        if matches_negative(&negatives, adv.name.as_str()) {
            continue;
        }
        let dst_name = RefName::new(dst);
        let fetch_head_status = if merge_src == Some(adv.name.as_str()) {
            FetchHeadStatus::Merge
        } else {
            FetchHeadStatus::NotForMerge
        };
        push_candidate(
            &mut refs,
            &mut mapped_dsts,
            adv.name.clone(),
            dst_name,
            adv.oid,
            adv.symref.clone(),
            force,
            fetch_head_status,
            &local_ref_oid,
        );
    }

    // Step 5: tag policy.
    match tag_policy {
        TagPolicy::Unset => {}
        TagPolicy::Set => {
            for adv in advertised {
                if !adv.name.is_tag() {
                    continue;
                }
                if matches_negative(&negatives, adv.name.as_str()) {
                    continue;
                }
                push_candidate(
                    &mut refs,
                    &mut mapped_dsts,
                    adv.name.clone(),
                    adv.name.clone(),
                    adv.oid,
                    adv.symref.clone(),
                    false,
                    FetchHeadStatus::NotForMerge,
                    &local_ref_oid,
                );
            }
        }
        TagPolicy::Default => {
            for adv in advertised {
                if !adv.name.is_tag() {
                    continue;
                }
                if local_ref_oid(adv.name.as_str()).is_some() {
                    continue;
                }
                if matches_negative(&negatives, adv.name.as_str()) {
                    continue;
                }
                let target = adv.peeled.unwrap_or(adv.oid);
                let target_satisfied = local_has_object(&target)
                    || refs.iter().any(|r: &Ref| r.new_oid == target);
                if !target_satisfied {
                    continue;
                }
                let peer_ref = refs.iter().position(|r| r.new_oid == target);
                let idx = refs.len();
                push_candidate(
                    &mut refs,
                    &mut mapped_dsts,
                    adv.name.clone(),
                    adv.name.clone(),
                    adv.oid,
                    adv.symref.clone(),
                    false,
                    FetchHeadStatus::NotForMerge,
                    &local_ref_oid,
                );
                if let (Some(peer), Some(entry)) = (peer_ref, refs.get_mut(idx)) {
                    entry.peer_ref = Some(peer);
                }
            }
        }
    }

    refs
}

#[allow(clippy::too_many_arguments)]
fn push_candidate(
    refs: &mut Vec<Ref>,
    mapped_dsts: &mut std::collections::HashSet<Box<str>>,
    source_name: RefName,
    dst_name: RefName,
    new_oid: ObjectId,
    symref: Option<RefName>,
    force: bool,
    fetch_head_status: FetchHeadStatus,
    local_ref_oid: &impl Fn(&str) -> Option<ObjectId>,
) {
    let key: Box<str> = dst_name.as_str().into();
    if mapped_dsts.contains(&key) {
        return;
    }
    mapped_dsts.insert(key);
    let old_oid = local_ref_oid(dst_name.as_str()).unwrap_or_else(ObjectId::null);
    refs.push(Ref {
        name: dst_name,
        source_name,
        old_oid,
        new_oid,
        symref,
        peer_ref: None,
        force,
        status: RefStatus::None,
        fetch_head_status,
    });
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::refspec::RefspecItem;

    fn adv(name: &str, oid_byte: u8) -> AdvertisedRef {
        let mut bytes = [0u8; 20];
        bytes[19] = oid_byte;
        AdvertisedRef {
            name: RefName::new(name),
            oid: ObjectId::try_from(&bytes[..]).unwrap(),
            symref: None,
            peeled: None,
        }
    }

    #[test]
    fn simple_pattern_refspec_maps_one_branch_not_for_merge() {
        let specs = vec![RefspecItem::parse("refs/heads/*:refs/remotes/origin/*", true).unwrap()];
        let advertised = vec![adv("refs/heads/main", 1)];
        let refs = build_ref_map(&advertised, &specs, TagPolicy::Unset, false, |_| None, |_| false);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name.as_str(), "refs/remotes/origin/main");
        assert_eq!(refs[0].fetch_head_status, FetchHeadStatus::NotForMerge);
    }

    #[test]
    fn literal_single_refspec_is_merge_candidate() {
        let specs = vec![RefspecItem::parse("refs/heads/main:refs/remotes/origin/main", true).unwrap()];
        let advertised = vec![adv("refs/heads/main", 1)];
        let refs = build_ref_map(&advertised, &specs, TagPolicy::Unset, false, |_| None, |_| false);
        assert_eq!(refs[0].fetch_head_status, FetchHeadStatus::Merge);
    }

    #[test]
    fn secondary_literal_refspec_is_not_for_merge() {
        let specs = vec![
            RefspecItem::parse("refs/heads/main:refs/remotes/origin/main", true).unwrap(),
            RefspecItem::parse("refs/heads/dev:refs/remotes/origin/dev", true).unwrap(),
        ];
        let advertised = vec![adv("refs/heads/main", 1), adv("refs/heads/dev", 2)];
        let refs = build_ref_map(&advertised, &specs, TagPolicy::Unset, false, |_| None, |_| false);
        let main_ref = refs.iter().find(|r| r.name.as_str() == "refs/remotes/origin/main").unwrap();
        let dev_ref = refs.iter().find(|r| r.name.as_str() == "refs/remotes/origin/dev").unwrap();
        assert_eq!(main_ref.fetch_head_status, FetchHeadStatus::Merge);
        assert_eq!(dev_ref.fetch_head_status, FetchHeadStatus::NotForMerge);
    }

    #[test]
    fn negative_refspec_excludes_matching_source() {
        let specs = vec![
            RefspecItem::parse("refs/heads/*:refs/remotes/origin/*", true).unwrap(),
            RefspecItem::parse("^refs/heads/wip", true).unwrap(),
        ];
        let advertised = vec![adv("refs/heads/main", 1), adv("refs/heads/wip", 2)];
        let refs = build_ref_map(&advertised, &specs, TagPolicy::Unset, false, |_| None, |_| false);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name.as_str(), "refs/remotes/origin/main");
    }

    #[test]
    fn prefetch_rewrites_destination_and_drops_tags() {
        let specs = vec![RefspecItem::parse("refs/heads/*:refs/remotes/origin/*", true).unwrap()];
        let advertised = vec![adv("refs/heads/main", 1)];
        let refs = build_ref_map(&advertised, &specs, TagPolicy::Unset, true, |_| None, |_| false);
        assert_eq!(refs[0].name.as_str(), "refs/prefetch/remotes/origin/main");
        assert!(refs[0].force);
    }

    #[test]
    fn tag_set_policy_fetches_all_tags() {
        let specs = vec![RefspecItem::parse("refs/heads/*:refs/remotes/origin/*", true).unwrap()];
        let advertised = vec![adv("refs/heads/main", 1), adv("refs/tags/v1", 2)];
        let refs = build_ref_map(&advertised, &specs, TagPolicy::Set, false, |_| None, |_| false);
        assert!(refs.iter().any(|r| r.name.as_str() == "refs/tags/v1"));
    }

    #[test]
    fn tag_default_policy_skips_unreachable_targets() {
        let specs = vec![RefspecItem::parse("refs/heads/*:refs/remotes/origin/*", true).unwrap()];
        let mut tag = adv("refs/tags/v1", 2);
        tag.peeled = Some(adv("x", 9).oid);
        let advertised = vec![adv("refs/heads/main", 1), tag];
        let refs = build_ref_map(&advertised, &specs, TagPolicy::Default, false, |_| None, |_| false);
        assert!(!refs.iter().any(|r| r.name.as_str() == "refs/tags/v1"));
    }

    #[test]
    fn tag_default_policy_follows_reachable_targets() {
        let specs = vec![RefspecItem::parse("refs/heads/*:refs/remotes/origin/*", true).unwrap()];
        let mut tag = adv("refs/tags/v1", 2);
        tag.peeled = Some(adv("refs/heads/main", 1).oid);
        let advertised = vec![adv("refs/heads/main", 1), tag];
        let refs = build_ref_map(&advertised, &specs, TagPolicy::Default, false, |_| None, |_| false);
        let tag_ref = refs.iter().find(|r| r.name.as_str() == "refs/tags/v1").unwrap();
        assert!(tag_ref.peer_ref.is_some());
    }

    #[test]
    fn dedup_keeps_first_mapping_to_a_destination() {
        let specs = vec![
            RefspecItem::parse("refs/heads/main:refs/remotes/origin/x", true).unwrap(),
            RefspecItem::parse("refs/heads/wip:refs/remotes/origin/x", true).unwrap(),
        ];
        let advertised = vec![adv("refs/heads/main", 1), adv("refs/heads/wip", 2)];
        let refs = build_ref_map(&advertised, &specs, TagPolicy::Unset, false, |_| None, |_| false);
        assert_eq!(refs.len(), 1);
    }
}
