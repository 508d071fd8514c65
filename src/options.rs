//! Fetch configuration.
//!
//! The source keeps these as file-scope statics (`force`, `dry_run`,
//! `verbosity`, the computed shallow-depth options, ...). Per the
//! REDESIGN FLAGS, this crate instead gathers them into one immutable
//! value built once by the caller and threaded through the orchestrator;
//! there is no global mutable option state anywhere in this crate.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutput {
    Full,
    Compact,
}

impl Default for FetchOutput {
    fn default() -> Self {
        FetchOutput::Full
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeepenOptions {
    pub depth: Option<u32>,
    pub shallow_since: Option<Box<str>>,
    pub shallow_exclude: Vec<Box<str>>,
    pub deepen_relative: bool,
    pub update_shallow: bool,
}

impl DeepenOptions {
    pub fn requests_deepening(&self) -> bool {
        self.depth.is_some() || self.shallow_since.is_some() || !self.shallow_exclude.is_empty()
    }
}

/// A `url.<base>.insteadof` / `url.<base>.pushinsteadof` rewrite rule:
/// any remote URL beginning with `original` has that prefix replaced by
/// `base`. The longest matching `original` wins.
#[derive(Debug, Clone)]
pub struct UrlRewrite {
    pub base: Box<str>,
    pub original: Box<str>,
    pub push_only: bool,
}

pub fn rewrite_url<'a>(rules: &'a [UrlRewrite], url: &str, for_push: bool) -> Option<String> {
    rules
        .iter()
        .filter(|r| !r.push_only || for_push)
        .filter(|r| url.starts_with(r.original.as_ref()))
        .max_by_key(|r| r.original.len())
        .map(|r| format!("{}{}", r.base, &url[r.original.len()..]))
}

/// Immutable, per-fetch configuration, constructed once by the caller
/// from the recognized `fetch.*`/`remote.<name>.*` configuration keys.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// `fetch.prune` / `remote.<name>.prune`, already resolved by the
    /// caller against the remote's own tri-state.
    pub prune: bool,
    pub prune_tags: bool,
    /// `fetch.showforcedupdates` — when false, the fast-forward check
    /// is skipped entirely and updates are assumed fast-forward.
    pub show_forced_updates: bool,
    /// `fetch.parallel` / `--jobs`, consumed by the multi-remote driver.
    pub parallel: usize,
    pub output: FetchOutput,
    pub write_commit_graph: bool,
    /// Whether to wrap all ref updates in one transaction.
    pub atomic: bool,
    /// Whether FETCH_HEAD is truncated (`false`) or appended to (`true`)
    /// at the start of this fetch.
    pub append: bool,
    /// `--force` / `-f`: allow non-fast-forward updates globally.
    pub force: bool,
    /// Allow updating the ref checked out in a non-bare working tree.
    pub update_head_ok: bool,
    pub deepen: DeepenOptions,
    pub url_rewrites: Vec<UrlRewrite>,
    /// `core.promisedblobcommand`.
    pub promised_blob_command: Option<Box<str>>,
    /// `extensions.partialclonefilter`, the default filter for promisor
    /// remotes that did not negotiate one explicitly.
    pub default_partial_clone_filter: Option<Box<str>>,
    pub timeout: Option<Duration>,
    pub dry_run: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            prune: false,
            prune_tags: false,
            show_forced_updates: true,
            parallel: 1,
            output: FetchOutput::default(),
            write_commit_graph: false,
            atomic: false,
            append: false,
            force: false,
            update_head_ok: false,
            deepen: DeepenOptions::default(),
            url_rewrites: Vec::new(),
            promised_blob_command: None,
            default_partial_clone_filter: None,
            timeout: None,
            dry_run: false,
        }
    }
}
