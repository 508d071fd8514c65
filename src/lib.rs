//! Core fetch engine: refspec resolution, ref-map negotiation, object
//! filters, promised-object tracking, and the orchestrator that ties them
//! into one fetch. The wire protocol, the on-disk object store, and any
//! particular VCS frontend are external collaborators, injected through
//! the [`Transport`] and [`ObjectStore`] capabilities.

pub mod connectivity;
pub mod fetchhead;
pub mod filter;
pub mod keepfile;
pub mod multi;
pub mod objectstore;
pub mod oid;
pub mod options;
pub mod orchestrator;
pub mod promised;
pub mod refmap;
pub mod refname;
pub mod refspec;
pub mod remote;
pub mod transport;

pub use objectstore::{Ancestry, ObjectStore, RefTxn};
pub use oid::ObjectId;
pub use options::FetchOptions;
pub use orchestrator::{FetchSummary, Orchestrator};
pub use refmap::Ref;
pub use refname::RefName;
pub use remote::{Remote, TagPolicy};
pub use transport::Transport;

use std::path::PathBuf;

/// Runs a single remote's fetch to completion: lists refs, builds the ref
/// map, classifies and applies updates, and writes FETCH_HEAD.
///
/// Thin wrapper around [`Orchestrator::run`] for callers with only one
/// remote; a caller driving several remotes concurrently should build
/// [`multi::FetchJob`]s directly and hand them to [`multi::fetch_all`]
/// instead, so FETCH_HEAD is truncated once up front.
#[allow(clippy::too_many_arguments)]
pub fn fetch_one<T, S>(
    transport: &mut T,
    store: &S,
    options: &FetchOptions,
    remote: &Remote,
    remote_url: &str,
    fetch_head_path: PathBuf,
    current_branch: Option<RefName>,
) -> Result<FetchSummary, orchestrator::Error<S::Error>>
where
    T: Transport,
    S: ObjectStore,
{
    let mut orchestrator = Orchestrator {
        transport,
        store,
        options,
        remote,
        fetch_head_path,
        current_branch,
    };
    orchestrator.run(remote_url)
}
