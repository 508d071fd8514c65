//! The `ObjectStore` capability: the local content-addressed store and
//! its reference database, injected by the caller. The core never
//! touches packfiles, loose objects, or delta reconstruction directly —
//! it only asks these questions.
//!
//! The capability shape and the ancestry/fast-forward classification it
//! enables are grounded on `git/repository.rs` (`ancestry`,
//! `refname_to_id`, `update`/`direct`/`prune`), generalized away from a
//! concrete `git2::Repository` backend to a trait boundary, since the
//! on-disk object and ref store format is deliberately out of scope
//! here.

use thiserror::Error;

use crate::oid::ObjectId;
use crate::refname::RefName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancestry {
    Equal,
    Ahead,
    Behind,
    Diverged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

#[derive(Debug, Clone, Copy)]
pub struct ObjectInfo {
    pub kind: ObjectKind,
    pub size: u64,
}

/// Controls whether `ObjectStore::has` is allowed to trigger an
/// on-demand fetch of a promised blob, and whether it may take a slow
/// path (e.g. opening packs) to answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HasQuery {
    pub skip_fetch_object: bool,
    pub quick: bool,
}

#[derive(Debug, Error)]
pub enum TxnError {
    #[error("ref transaction conflicts with an existing name in the ref namespace")]
    NameConflict,
    #[error("ref transaction failed: {0}")]
    Other(String),
}

/// An open, uncommitted batch of ref updates.
pub trait RefTxn {
    /// Stages an update. `expected_old_oid`, when set, makes the update
    /// fail at commit time if the ref's current value does not match
    /// (optimistic-concurrency guard against a concurrent writer).
    fn update(
        &mut self,
        name: &RefName,
        new_oid: ObjectId,
        expected_old_oid: Option<ObjectId>,
        reflog_msg: &str,
    );

    fn commit(self: Box<Self>) -> Result<(), TxnError>;
}

pub trait ObjectStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn has(&self, oid: &ObjectId, query: HasQuery) -> Result<bool, Self::Error>;

    /// `Unknown` kind/size is legal for a promised blob whose bytes are
    /// absent; callers must not infer non-existence from it.
    fn object_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, Self::Error>;

    fn lookup_commit(&self, oid: &ObjectId) -> Result<Option<ObjectId>, Self::Error>;

    /// True if `candidate` is reachable from (an ancestor of, or equal
    /// to) any of `tips`.
    fn in_ancestors(&self, candidate: &ObjectId, tips: &[ObjectId]) -> Result<bool, Self::Error>;

    fn resolve_ref(&self, name: &RefName) -> Result<Option<ObjectId>, Self::Error>;

    fn begin_ref_transaction(&self) -> Result<Box<dyn RefTxn>, Self::Error>;

    /// Enumerates every local ref name, mirroring `for_each_ref`. Used by
    /// the pruning pass to find tracking refs the refspecs no longer
    /// produce; unlike `resolve_ref`, which answers for one name at a
    /// time, this is the only way to discover names the caller didn't
    /// already know to ask about.
    fn iter_refs(&self) -> Result<Vec<RefName>, Self::Error>;

    /// True if `tip`, and every commit, tree, and blob reachable from it,
    /// is already present in the local object database. A positive
    /// `has(tip)` only says the tip object itself is present; it says
    /// nothing about what it references. This walks the graph the way
    /// `check_connected` does, so a present-but-incomplete tip is
    /// correctly reported as not locally satisfiable.
    fn has_complete_history(&self, tip: &ObjectId) -> Result<bool, Self::Error>;

    /// Classifies the transition `old -> new`, as used by the fast-forward
    /// check during per-ref update classification. Peels both sides to
    /// commits first, matching `find_and_peel`/`graph_ahead_behind`.
    fn ancestry(&self, old: &ObjectId, new: &ObjectId) -> Result<Ancestry, Self::Error> {
        if old == new {
            return Ok(Ancestry::Equal);
        }
        let old_is_ancestor = self.in_ancestors(old, std::slice::from_ref(new))?;
        let new_is_ancestor = self.in_ancestors(new, std::slice::from_ref(old))?;
        Ok(match (old_is_ancestor, new_is_ancestor) {
            (true, false) => Ancestry::Ahead,
            (false, true) => Ancestry::Behind,
            _ => Ancestry::Diverged,
        })
    }
}
