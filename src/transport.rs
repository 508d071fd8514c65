//! The `Transport` capability: the wire protocol boundary. The byte-level
//! protocol and its concrete carriers (HTTP/HTTPS, local, smart-HTTP
//! helpers) are external collaborators — the orchestrator only ever
//! calls through this trait. A production backend implements it over a
//! real smart-HTTP/git-daemon client (handshake, ls-refs round,
//! negotiate-and-receive-pack); that wire-level mechanics stays outside
//! this crate, which only depends on the trait boundary.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::objectstore::ObjectStore;
use crate::oid::ObjectId;
use crate::refname::RefName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedRefLine {
    pub name: RefName,
    pub oid: ObjectId,
    pub symref: Option<RefName>,
    pub peeled: Option<ObjectId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionOutcome {
    Accepted,
    Unsupported,
    Invalid,
}

/// The recognized `set_option` names a transport may accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOption {
    UploadPack(Box<str>),
    Depth(u32),
    ShallowSince(Box<str>),
    ShallowExclude(Box<str>),
    DeepenRelative,
    UpdateShallow,
    FollowTags,
    Filter(Box<str>),
    FromPromisor,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport failure: {0}")]
    Failed(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Path to the received pack (and its `.idx`), with a `.keep` lock
    /// already held by the transport until the orchestrator releases it.
    pub pack_path: Box<str>,
    pub keep_path: Option<Box<str>>,
}

pub trait Transport {
    /// Establishes the connection and performs the protocol handshake.
    fn connect(&mut self, remote_url: &str, service: &str) -> Result<(), TransportError>;

    /// Lists refs, optionally narrowed by `ref_prefixes` (an empty slice
    /// requests the full advertisement).
    fn list_refs(&mut self, ref_prefixes: &[RefName]) -> Result<Vec<AdvertisedRefLine>, TransportError>;

    fn set_option(&mut self, option: TransportOption) -> Result<OptionOutcome, TransportError>;

    /// Negotiates and drains the pack for `request` onto disk.
    fn fetch_refs(&mut self, request: &WantsHaves) -> Result<FetchOutcome, TransportError>;

    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Releases any `.keep` lock the last `fetch_refs` call created,
    /// independent of the [`Keepfile`](crate::keepfile::Keepfile) guard
    /// the orchestrator also holds — used on the cancellation path where
    /// the transport itself must unlock before tearing down.
    fn unlock_pack(&mut self) -> Result<(), TransportError>;
}

/// The negotiated want/have sets for one fetch round. Grounded on the
/// teacher's `transport::WantsHaves`: for each mapped ref, the existing
/// local value becomes a `have` and the remote's advertised value
/// becomes a `want`, unless we can already prove we hold it.
#[derive(Clone, Debug, Default)]
pub struct WantsHaves {
    pub wants: BTreeSet<ObjectId>,
    pub haves: BTreeSet<ObjectId>,
}

impl WantsHaves {
    pub fn want(&mut self, oid: ObjectId) {
        if !self.haves.contains(&oid) {
            self.wants.insert(oid);
        }
    }

    pub fn have(&mut self, oid: ObjectId) {
        self.wants.remove(&oid);
        self.haves.insert(oid);
    }

    /// Builds the want/have ranges for a batch of `(local_name, tip)`
    /// pairs: if the local ref exists, its current value becomes a have
    /// and the tip a want (skipped if we already hold the tip); if the
    /// local ref is absent, the tip is wanted unless already held.
    pub fn add<S: ObjectStore>(
        &mut self,
        store: &S,
        refs: impl IntoIterator<Item = (RefName, ObjectId)>,
    ) -> Result<&mut Self, S::Error> {
        for (name, tip) in refs {
            match store.resolve_ref(&name)? {
                Some(oid) => {
                    let want = oid != tip
                        && !store.has(&tip, crate::objectstore::HasQuery::default())?;
                    self.have(oid);
                    if want {
                        self.want(tip);
                    }
                }
                None => {
                    if !store.has(&tip, crate::objectstore::HasQuery::default())? {
                        self.want(tip);
                    }
                }
            }
        }
        Ok(self)
    }
}
