//! FETCH_HEAD writer.
//!
//! Grounded on `open_fetch_head`/`append_fetch_head`/`commit_fetch_head`/
//! `close_fetch_head` and `store_updated_refs`'s three-pass loop over
//! `FetchHeadStatus` in `builtin/fetch.c`.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::oid::ObjectId;
use crate::refmap::{FetchHeadStatus, Ref};
use crate::refname::RefKind;

fn escape_newlines(s: &str) -> String {
    s.replace('\n', "\\n")
}

fn marker_for(status: FetchHeadStatus) -> &'static str {
    match status {
        FetchHeadStatus::Merge => "",
        FetchHeadStatus::NotForMerge => "not-for-merge",
        FetchHeadStatus::Ignore => "not-for-merge",
    }
}

/// Builds the `<note>` column: `[<kind> ]'<short-name>' of <url>`.
fn note_for(r: &Ref, anonymized_url: &str) -> String {
    let kind = r.source_name.kind_label();
    let kind_prefix = match kind {
        RefKind::Branch => "branch ",
        RefKind::Tag => "tag ",
        RefKind::Other => "",
    };
    format!(
        "{kind_prefix}'{}' of {}",
        r.source_name.short_name(),
        escape_newlines(anonymized_url)
    )
}

fn format_line(oid: ObjectId, status: FetchHeadStatus, note: &str) -> String {
    format!("{}\t{}\t{}\n", oid.to_hex(), marker_for(status), note)
}

/// Accumulates FETCH_HEAD lines for one fetch. In atomic mode, lines are
/// buffered in memory and only reach disk on [`commit`](Self::commit);
/// any failure before that should call [`discard`](Self::discard)
/// instead so the file is left untouched, preserving the pre-fetch state.
/// In non-atomic mode each line is written through immediately
/// as the corresponding ref update succeeds.
pub struct FetchHeadWriter {
    path: PathBuf,
    atomic: bool,
    buffer: Vec<u8>,
}

impl FetchHeadWriter {
    /// Opens (truncating unless `append`) the FETCH_HEAD file at `path`.
    pub fn open(path: impl Into<PathBuf>, append: bool, atomic: bool) -> io::Result<Self> {
        let path = path.into();
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(!append)
            .open(&path)?;
        Ok(Self {
            path,
            atomic,
            buffer: Vec::new(),
        })
    }

    fn emit(&mut self, line: &str) -> io::Result<()> {
        if self.atomic {
            self.buffer.extend_from_slice(line.as_bytes());
            Ok(())
        } else {
            let mut file = OpenOptions::new().append(true).open(&self.path)?;
            file.write_all(line.as_bytes())
        }
    }

    /// Writes the lines for one successfully-updated ref. Refs with
    /// `FetchHeadStatus::Ignore` (opportunistic duplicates) are accepted
    /// but produce no line.
    pub fn append_ref(&mut self, r: &Ref, anonymized_url: &str) -> io::Result<()> {
        if r.fetch_head_status == FetchHeadStatus::Ignore {
            return Ok(());
        }
        let note = note_for(r, anonymized_url);
        let line = format_line(r.new_oid, r.fetch_head_status, &note);
        self.emit(&line)
    }

    /// Writes all MERGE-status lines, then all NOT_FOR_MERGE-status
    /// lines, in original order within each group; IGNORE entries are
    /// skipped. This is the three-pass emission order FETCH_HEAD readers
    /// depend on to find the default merge target on the first line.
    pub fn append_all(&mut self, refs: &[Ref], anonymized_url: &str) -> io::Result<()> {
        for status in [FetchHeadStatus::Merge, FetchHeadStatus::NotForMerge] {
            for r in refs.iter().filter(|r| r.fetch_head_status == status) {
                self.append_ref(r, anonymized_url)?;
            }
        }
        Ok(())
    }

    /// Flushes a buffered (atomic-mode) writer to disk. A no-op in
    /// non-atomic mode, where lines were already written through.
    pub fn commit(self) -> io::Result<()> {
        if self.atomic && !self.buffer.is_empty() {
            let mut file = OpenOptions::new().append(true).open(&self.path)?;
            file.write_all(&self.buffer)?;
        }
        Ok(())
    }

    /// Drops any buffered lines without writing them — the atomic-mode
    /// abort path, leaving FETCH_HEAD exactly as it was before this
    /// fetch's append phase began.
    pub fn discard(self) {
        drop(self);
    }
}

pub fn path_for(git_dir: impl AsRef<Path>) -> PathBuf {
    git_dir.as_ref().join("FETCH_HEAD")
}

/// Compact display name for `fetch.output=compact`, mirroring the
/// source's `find_and_replace` helper, including its documented
/// off-by-one behavior on a trailing `/`: when the common prefix between
/// the old and new display names ends exactly on a `/`, one extra byte
/// of the differing suffix is swallowed along with the shared prefix.
/// Preserved byte-for-byte per Open Question (c) — this is a cosmetic,
/// display-only path with no effect on which refs or objects are
/// written, so "fixing" it would only create an unexplainable deviation
/// from the behavior operators have already built muscle memory around.
pub fn compact_note(old_name: &str, new_name: &str) -> String {
    let common = old_name
        .bytes()
        .zip(new_name.bytes())
        .take_while(|(a, b)| a == b)
        .count();
    if common > 0 && old_name.as_bytes().get(common - 1) == Some(&b'/') {
        new_name
            .get(common..)
            .and_then(|rest| rest.get(1..))
            .unwrap_or("")
            .to_owned()
    } else {
        new_name.get(common..).unwrap_or("").to_owned()
    }
}
