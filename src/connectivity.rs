//! Connectivity prober: decides whether a candidate ref map's objects
//! are already locally present and reachable, letting the orchestrator
//! skip the transfer phase entirely.
//!
//! Grounded on `check_connected`/`iterate_ref_map` in `builtin/fetch.c`
//! (which walks the ref map skipping shallow-rejected entries) and the
//! teacher's `repository::ancestry`.

use crate::objectstore::{HasQuery, ObjectStore};
use crate::oid::ObjectId;
use crate::refmap::{Ref, RefStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Connected,
    NotConnected,
}

/// Probes whether `refs` can be satisfied without a transfer.
/// `deepening_requested` forces `NotConnected`, since a shallow
/// deepen/unshallow always needs a negotiation round with the remote
/// regardless of what's locally present.
pub fn probe<S: ObjectStore>(
    refs: &[Ref],
    deepening_requested: bool,
    store: &S,
) -> Result<Connectivity, S::Error> {
    if deepening_requested {
        return Ok(Connectivity::NotConnected);
    }

    let targets: Vec<ObjectId> = refs
        .iter()
        .filter(|r| r.status != RefStatus::RejectShallow)
        .filter(|r| !r.new_oid.is_null())
        .map(|r| r.new_oid)
        .collect();

    for target in &targets {
        let present = store.has(
            target,
            HasQuery {
                skip_fetch_object: true,
                quick: true,
            },
        )?;
        if !present {
            return Ok(Connectivity::NotConnected);
        }
        // A present tip says nothing about its ancestors, trees, or
        // blobs; check_connected's rev-list walk is what actually rules
        // out a dangling or partial object graph underneath it.
        if !store.has_complete_history(target)? {
            return Ok(Connectivity::NotConnected);
        }
    }

    Ok(Connectivity::Connected)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::refname::RefName;
    use crate::refmap::FetchHeadStatus;
    use std::cell::RefCell;
    use std::collections::HashSet;

    struct FakeStore {
        present: RefCell<HashSet<ObjectId>>,
        /// Tips whose full history (not just the tip object) is complete.
        complete: RefCell<HashSet<ObjectId>>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("fake store error")]
    struct FakeError;

    impl ObjectStore for FakeStore {
        type Error = FakeError;

        fn has(&self, oid: &ObjectId, _query: HasQuery) -> Result<bool, Self::Error> {
            Ok(self.present.borrow().contains(oid))
        }

        fn object_info(&self, _oid: &ObjectId) -> Result<Option<crate::objectstore::ObjectInfo>, Self::Error> {
            Ok(None)
        }

        fn lookup_commit(&self, _oid: &ObjectId) -> Result<Option<ObjectId>, Self::Error> {
            Ok(None)
        }

        fn in_ancestors(&self, _candidate: &ObjectId, _tips: &[ObjectId]) -> Result<bool, Self::Error> {
            Ok(true)
        }

        fn resolve_ref(&self, _name: &RefName) -> Result<Option<ObjectId>, Self::Error> {
            Ok(None)
        }

        fn begin_ref_transaction(&self) -> Result<Box<dyn crate::objectstore::RefTxn>, Self::Error> {
            unimplemented!()
        }

        fn iter_refs(&self) -> Result<Vec<RefName>, Self::Error> {
            Ok(Vec::new())
        }

        fn has_complete_history(&self, tip: &ObjectId) -> Result<bool, Self::Error> {
            Ok(self.complete.borrow().contains(tip))
        }
    }

    fn oid(byte: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        ObjectId::try_from(&bytes[..]).unwrap()
    }

    fn make_ref(name: &str, new_oid: ObjectId) -> Ref {
        Ref {
            name: RefName::new(name),
            source_name: RefName::new(name),
            old_oid: ObjectId::null(),
            new_oid,
            symref: None,
            peer_ref: None,
            force: false,
            status: RefStatus::None,
            fetch_head_status: FetchHeadStatus::Merge,
        }
    }

    #[test]
    fn deepening_always_reports_not_connected() {
        let store = FakeStore {
            present: RefCell::new(HashSet::new()),
            complete: RefCell::new(HashSet::new()),
        };
        let refs = vec![make_ref("refs/heads/main", oid(1))];
        assert_eq!(probe(&refs, true, &store).unwrap(), Connectivity::NotConnected);
    }

    #[test]
    fn missing_target_reports_not_connected() {
        let store = FakeStore {
            present: RefCell::new(HashSet::new()),
            complete: RefCell::new(HashSet::new()),
        };
        let refs = vec![make_ref("refs/heads/main", oid(1))];
        assert_eq!(probe(&refs, false, &store).unwrap(), Connectivity::NotConnected);
    }

    #[test]
    fn all_present_reports_connected() {
        let mut present = HashSet::new();
        present.insert(oid(1));
        let mut complete = HashSet::new();
        complete.insert(oid(1));
        let store = FakeStore {
            present: RefCell::new(present),
            complete: RefCell::new(complete),
        };
        let refs = vec![make_ref("refs/heads/main", oid(1))];
        assert_eq!(probe(&refs, false, &store).unwrap(), Connectivity::Connected);
    }

    #[test]
    fn present_tip_with_missing_ancestor_reports_not_connected() {
        // oid(1) is physically present, but its history is incomplete
        // (some ancestor/tree/blob it references is missing) — this must
        // not be reported as connected just because the tip exists.
        let mut present = HashSet::new();
        present.insert(oid(1));
        let store = FakeStore {
            present: RefCell::new(present),
            complete: RefCell::new(HashSet::new()),
        };
        let refs = vec![make_ref("refs/heads/main", oid(1))];
        assert_eq!(probe(&refs, false, &store).unwrap(), Connectivity::NotConnected);
    }
}
