//! Fetch orchestrator: the top-level state machine.
//!
//! States: `Init → TruncateFetchHead → ListRemoteRefs → BuildRefMap →
//! ClassifyCurrentBranchSafety → (Prune?) → TransferObjects →
//! VerifyConnectivity → OpenRefTransaction → PerEntryUpdate →
//! CommitTransaction → (TagBackfill?) → Done`.
//!
//! Grounded on `builtin/fetch.c`'s `store_updated_refs`/
//! `update_local_ref`/`append_fetch_head` family for classification
//! order and FETCH_HEAD semantics, and on `state.rs::run`/
//! `stage.rs::ProtocolStage` for the overall stage sequencing shape.

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::connectivity::{self, Connectivity};
use crate::fetchhead::FetchHeadWriter;
use crate::objectstore::{Ancestry, HasQuery, ObjectStore, TxnError};
use crate::oid::ObjectId;
use crate::options::FetchOptions;
use crate::refmap::{self, AdvertisedRef, FetchHeadStatus, Ref, RefStatus};
use crate::refname::RefName;
use crate::refspec::{apply_refspecs, match_name_with_pattern, matches_negative, RefspecItem};
use crate::remote::Remote;
use crate::transport::{OptionOutcome, Transport, TransportError, TransportOption, WantsHaves};

#[derive(Debug, Error)]
pub enum Error<SE: std::error::Error + Send + Sync + 'static> {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("object store error: {0}")]
    Store(SE),
    #[error(transparent)]
    FetchHead(#[from] io::Error),
    #[error(transparent)]
    Txn(#[from] TxnError),
    #[error("connectivity check failed after transfer: objects still missing")]
    MissingObjects,
    #[error("atomic fetch aborted: {0}")]
    AtomicAborted(String),
}

#[derive(Debug, Default)]
pub struct FetchSummary {
    pub applied: Vec<Ref>,
    pub rejected: Vec<Ref>,
    pub pruned: Vec<RefName>,
    pub warnings: Vec<String>,
}

impl FetchSummary {
    pub fn is_success(&self) -> bool {
        self.rejected.is_empty()
    }
}

pub struct Orchestrator<'a, T, S> {
    pub transport: &'a mut T,
    pub store: &'a S,
    pub options: &'a FetchOptions,
    pub remote: &'a Remote,
    pub fetch_head_path: PathBuf,
    /// The ref currently checked out in a non-bare working tree, if any.
    pub current_branch: Option<RefName>,
}

impl<'a, T, S> Orchestrator<'a, T, S>
where
    T: Transport,
    S: ObjectStore,
{
    pub fn run(&mut self, remote_url: &str) -> Result<FetchSummary, Error<S::Error>> {
        // TruncateFetchHead / ListRemoteRefs
        let mut fetch_head = FetchHeadWriter::open(&self.fetch_head_path, self.options.append, self.options.atomic)?;
        self.transport.connect(remote_url, "git-upload-pack")?;
        self.apply_transport_options()?;
        let advertised_lines = self.transport.list_refs(&[])?;
        let advertised: Vec<AdvertisedRef> = advertised_lines
            .iter()
            .map(|l| AdvertisedRef {
                name: l.name.clone(),
                oid: l.oid,
                symref: l.symref.clone(),
                peeled: l.peeled,
            })
            .collect();

        // BuildRefMap
        let mut refs = refmap::build_ref_map(
            &advertised,
            &self.remote.fetch,
            self.remote.fetch_tags,
            false,
            |name| self.store.resolve_ref(&RefName::new(name)).unwrap_or(None),
            |oid| {
                self.store
                    .has(oid, HasQuery::default())
                    .unwrap_or(false)
            },
        );

        // ClassifyCurrentBranchSafety + per-ref classification.
        for r in &mut refs {
            self.classify(r)?;
        }

        let mut warnings = Vec::new();

        // Pruning: computed and deleted before the transfer, in its own
        // batch transaction, the same way `prune_refs` calls `delete_refs`
        // ahead of `fetch_refs`/`consume_refs` rather than folding
        // deletions into the update transaction that follows the transfer.
        let mut pruned = Vec::new();
        if self.options.prune && !self.remote.fetch.is_empty() {
            pruned = self.prune_stale_refs(&advertised)?;
            if !pruned.is_empty() {
                let mut prune_txn = self.store.begin_ref_transaction().map_err(Error::Store)?;
                for name in &pruned {
                    prune_txn.update(name, ObjectId::null(), None, "fetch: prune");
                }
                prune_txn.commit()?;
            }
        }

        // VerifyConnectivity / TransferObjects.
        let deepening = self.options.deepen.requests_deepening();
        let connectivity = connectivity::probe(&refs, deepening, self.store).map_err(Error::Store)?;
        if connectivity == Connectivity::NotConnected {
            let mut wants_haves = WantsHaves::default();
            wants_haves
                .add(
                    self.store,
                    refs.iter()
                        .filter(|r| r.status != RefStatus::UpToDate)
                        .map(|r| (r.name.clone(), r.new_oid)),
                )
                .map_err(Error::Store)?;
            let outcome = self.transport.fetch_refs(&wants_haves)?;
            let _ = outcome; // pack is owned by the object store once written; path is advisory here.

            let verified = connectivity::probe(&refs, false, self.store).map_err(Error::Store)?;
            if verified != Connectivity::Connected {
                return Err(Error::MissingObjects);
            }
        }

        // OpenRefTransaction / PerEntryUpdate / CommitTransaction.
        let (mut applied, rejected) = self.apply_updates(&mut refs, &mut fetch_head, remote_url)?;

        if self.options.atomic && !rejected.is_empty() {
            fetch_head.discard();
            return Ok(FetchSummary {
                applied: Vec::new(),
                rejected,
                pruned: Vec::new(),
                warnings,
            });
        }

        // TagBackfill: only meaningful once the primary transaction has
        // committed, since it re-checks tag targets against the
        // now-updated object database.
        if self.remote.fetch_tags == crate::remote::TagPolicy::Default {
            let backfilled = self.backfill_tags(&advertised, &refs, &mut fetch_head, remote_url)?;
            applied.extend(backfilled);
        }

        fetch_head.commit()?;

        if rejected
            .iter()
            .any(|r| r.status == RefStatus::RejectAlreadyExists)
        {
            warnings.push("some refs were rejected; run a prune to clear stale tracking refs".to_owned());
        }

        self.transport.disconnect()?;

        Ok(FetchSummary {
            applied,
            rejected,
            pruned,
            warnings,
        })
    }

    fn apply_transport_options(&mut self) -> Result<(), Error<S::Error>> {
        if let Some(filter) = &self.remote.partial_clone_filter {
            let outcome = self.transport.set_option(TransportOption::Filter(filter.clone()))?;
            if outcome == OptionOutcome::Unsupported {
                log::warn!(target: "fetch", "remote does not support filter {filter}");
            }
        }
        if let Some(depth) = self.options.deepen.depth {
            self.transport.set_option(TransportOption::Depth(depth))?;
        }
        Ok(())
    }

    fn classify(&self, r: &mut Ref) -> Result<(), Error<S::Error>> {
        if r.new_oid == r.old_oid {
            r.status = RefStatus::UpToDate;
            return Ok(());
        }

        let is_current_branch = self.current_branch.as_ref() == Some(&r.name);
        if is_current_branch && !self.options.update_head_ok && !r.old_oid.is_null() {
            // The source's REJECT_CURRENT_BRANCH has no direct analogue
            // in this taxonomy; the closest bucket is "needs force",
            // since the only way past this rejection is an explicit
            // override by the caller.
            r.status = RefStatus::RejectNeedsForce;
            return Ok(());
        }

        // Boundary: zero-length old OID is always a new ref, even under
        // refs/tags/ (tag-clobber rejection only applies when a local
        // value already exists to be clobbered).
        if r.old_oid.is_null() {
            r.status = RefStatus::NewRef;
            return Ok(());
        }

        // `--force` on the command line overrides every per-refspec
        // force flag, matching `s_update_ref`'s `force_update` in the
        // source.
        let force = r.force || self.options.force;

        if r.name.is_tag() {
            r.status = if force {
                RefStatus::TagUpdate
            } else {
                RefStatus::RejectAlreadyExists
            };
            return Ok(());
        }

        let old_commit = self.store.lookup_commit(&r.old_oid).map_err(Error::Store)?;
        let new_commit = self.store.lookup_commit(&r.new_oid).map_err(Error::Store)?;
        if old_commit.is_none() || new_commit.is_none() {
            r.status = RefStatus::NewRef;
            return Ok(());
        }

        if !self.options.show_forced_updates {
            r.status = RefStatus::FastForward;
            return Ok(());
        }

        let ancestry = self.store.ancestry(&r.old_oid, &r.new_oid).map_err(Error::Store)?;
        r.status = match ancestry {
            Ancestry::Equal => RefStatus::UpToDate,
            Ancestry::Ahead => RefStatus::FastForward,
            Ancestry::Behind | Ancestry::Diverged if force => RefStatus::ForcedUpdate,
            _ => RefStatus::RejectNonFastForward,
        };
        Ok(())
    }

    fn apply_updates(
        &self,
        refs: &mut [Ref],
        fetch_head: &mut FetchHeadWriter,
        remote_url: &str,
    ) -> Result<(Vec<Ref>, Vec<Ref>), Error<S::Error>> {
        let mut applied = Vec::new();
        let mut rejected = Vec::new();

        let mut txn = self.store.begin_ref_transaction().map_err(Error::Store)?;
        for r in refs.iter() {
            if matches!(
                r.status,
                RefStatus::FastForward | RefStatus::ForcedUpdate | RefStatus::NewRef | RefStatus::TagUpdate
            ) {
                txn.update(&r.name, r.new_oid, Some(r.old_oid), "fetch");
            }
        }

        let commit_result = txn.commit();
        for r in refs.iter_mut() {
            match r.status {
                RefStatus::FastForward | RefStatus::ForcedUpdate | RefStatus::NewRef | RefStatus::TagUpdate => {
                    if commit_result.is_ok() {
                        r.status = RefStatus::Ok;
                        applied.push(r.clone());
                    } else {
                        rejected.push(r.clone());
                    }
                }
                RefStatus::UpToDate | RefStatus::None | RefStatus::Ok => {}
                _ => rejected.push(r.clone()),
            }
        }

        // Written once in the writer's own three-pass merge/not-for-merge
        // order, so mixed statuses never interleave the way per-ref
        // inline appends during classification would allow.
        if commit_result.is_ok() && (!self.options.atomic || rejected.is_empty()) {
            let for_fetch_head: Vec<Ref> = refs
                .iter()
                .filter(|r| r.status == RefStatus::Ok || r.status == RefStatus::UpToDate)
                .cloned()
                .collect();
            fetch_head.append_all(&for_fetch_head, remote_url)?;
        }

        commit_result.map_err(Error::Txn)?;
        Ok((applied, rejected))
    }

    fn prune_stale_refs(&self, advertised: &[AdvertisedRef]) -> Result<Vec<RefName>, Error<S::Error>> {
        let local_refs = self.local_tracking_refs()?;
        Ok(compute_prune_candidates(&local_refs, &self.remote.fetch, advertised))
    }

    /// Enumerates the local refs a pruning pass should consider as
    /// candidates, mirroring `get_stale_heads`' use of `for_each_ref` to
    /// gather every local name before filtering by refspec destination.
    fn local_tracking_refs(&self) -> Result<Vec<RefName>, Error<S::Error>> {
        self.store.iter_refs().map_err(Error::Store)
    }

    /// Second pass after the primary transaction commits. `build_ref_map`
    /// only follows a tag under the default policy when its target is
    /// already present or already part of this fetch's own batch; a tag
    /// whose target only becomes reachable once the primary refs have
    /// been written (e.g. it points at a commit on a branch this fetch
    /// just updated, a few commits back) is otherwise dropped silently.
    /// Re-checks the remaining advertised tags against the now-updated
    /// object database and creates any that newly qualify.
    fn backfill_tags(
        &self,
        advertised: &[AdvertisedRef],
        primary_refs: &[Ref],
        fetch_head: &mut FetchHeadWriter,
        remote_url: &str,
    ) -> Result<Vec<Ref>, Error<S::Error>> {
        let negatives: Vec<RefspecItem> = self.remote.fetch.iter().filter(|r| r.negative).cloned().collect();
        let already: HashSet<&str> = primary_refs.iter().map(|r| r.name.as_str()).collect();

        let mut backfilled = Vec::new();
        for adv in advertised {
            if !adv.name.is_tag() || already.contains(adv.name.as_str()) {
                continue;
            }
            if matches_negative(&negatives, adv.name.as_str()) {
                continue;
            }
            if self.store.resolve_ref(&adv.name).map_err(Error::Store)?.is_some() {
                continue;
            }
            let target = adv.peeled.unwrap_or(adv.oid);
            let present = self
                .store
                .has(&target, HasQuery::default())
                .map_err(Error::Store)?;
            if !present {
                continue;
            }
            backfilled.push(Ref {
                name: adv.name.clone(),
                source_name: adv.name.clone(),
                old_oid: ObjectId::null(),
                new_oid: adv.oid,
                symref: adv.symref.clone(),
                peer_ref: None,
                force: false,
                status: RefStatus::NewRef,
                fetch_head_status: FetchHeadStatus::NotForMerge,
            });
        }

        if backfilled.is_empty() {
            return Ok(backfilled);
        }

        let mut txn = self.store.begin_ref_transaction().map_err(Error::Store)?;
        for r in &backfilled {
            txn.update(&r.name, r.new_oid, None, "fetch: tag backfill");
        }
        txn.commit()?;

        for r in &mut backfilled {
            r.status = RefStatus::Ok;
        }
        fetch_head.append_all(&backfilled, remote_url)?;

        Ok(backfilled)
    }
}

/// Stale local tracking refs: those that the remote's refspecs would
/// produce as a destination, but which no ref in the current
/// advertisement maps to.
pub fn compute_prune_candidates(
    local_refs: &[RefName],
    refspecs: &[RefspecItem],
    advertised: &[AdvertisedRef],
) -> Vec<RefName> {
    let current_dsts: HashSet<String> = advertised
        .iter()
        .filter_map(|a| apply_refspecs(refspecs, a.name.as_str()))
        .collect();

    local_refs
        .iter()
        .filter(|n| would_be_produced(refspecs, n.as_str()) && !current_dsts.contains(n.as_str()))
        .cloned()
        .collect()
}

fn would_be_produced(refspecs: &[RefspecItem], local_name: &str) -> bool {
    refspecs.iter().filter(|r| !r.negative && !r.matching).any(|r| {
        let Some(dst) = r.dst.as_deref() else {
            return false;
        };
        if r.pattern {
            match_name_with_pattern(dst, local_name).is_some()
        } else {
            dst == local_name
        }
    })
}
