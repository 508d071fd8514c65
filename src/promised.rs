//! Promised-object registry: a durable sorted array mapping the
//! identity of an object the local store does not physically hold to
//! its size, so partial clones remain logically complete.
//!
//! Grounded on `promised-blob.c`: `prepare_promised_blobs` (mmap + binary
//! search), `merge_promises` (stream-merge into a temp file, atomic
//! rename), and `request_promised_blobs` (hand a batch of identities to
//! an external fetcher process over its stdin).

use std::cell::RefCell;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use memmap2::Mmap;
use thiserror::Error;

use crate::oid::ObjectId;

const OID_SIZE: usize = 20;
const SIZE_FIELD: usize = 8;
const ENTRY_SIZE: usize = OID_SIZE + SIZE_FIELD;

#[derive(Debug, Error)]
pub enum Error {
    #[error("promised-object registry is corrupt: size {size} is not a multiple of {entry}")]
    Corrupt { size: u64, entry: usize },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid object id: {0}")]
    Oid(#[from] crate::oid::ParseError),
    #[error("external promised-object fetcher exited with {0}")]
    FetcherFailed(std::process::ExitStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PromisedEntry {
    pub oid: ObjectId,
    pub size: u64,
}

impl PromisedEntry {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.oid.as_bytes());
        out.extend_from_slice(&self.size.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let oid = ObjectId::try_from(&bytes[..OID_SIZE])?;
        let size = u64::from_be_bytes(bytes[OID_SIZE..ENTRY_SIZE].try_into().unwrap());
        Ok(Self { oid, size })
    }
}

/// A mmap'd, sorted, deduplicated array of [`PromisedEntry`] backed by a
/// file on disk. Rewritten atomically (temp file + rename) on merge; the
/// in-memory mapping is invalidated and lazily reopened afterwards,
/// which is the one legitimate piece of process-wide mutable state this
/// crate carries.
pub struct PromisedRegistry {
    path: PathBuf,
    mmap: RefCell<Option<Mmap>>,
}

impl PromisedRegistry {
    /// Opens (or, if absent, treats as empty) the registry file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        if path.exists() {
            let size = fs::metadata(&path)?.len();
            if size % ENTRY_SIZE as u64 != 0 {
                return Err(Error::Corrupt {
                    size,
                    entry: ENTRY_SIZE,
                });
            }
        }
        Ok(Self {
            path,
            mmap: RefCell::new(None),
        })
    }

    fn with_mapped<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R, Error> {
        let mut slot = self.mmap.borrow_mut();
        if slot.is_none() {
            if self.path.exists() && fs::metadata(&self.path)?.len() > 0 {
                let file = File::open(&self.path)?;
                // Safety: the registry owns this file exclusively for the
                // lifetime of the process and only ever replaces it via
                // atomic rename, never in-place truncation.
                let mmap = unsafe { Mmap::map(&file)? };
                *slot = Some(mmap);
            }
        }
        let bytes = slot.as_deref().unwrap_or(&[]);
        Ok(f(bytes))
    }

    fn entry_count(bytes: &[u8]) -> usize {
        bytes.len() / ENTRY_SIZE
    }

    fn entry_at(bytes: &[u8], index: usize) -> Result<PromisedEntry, Error> {
        let start = index * ENTRY_SIZE;
        PromisedEntry::decode(&bytes[start..start + ENTRY_SIZE])
    }

    /// Binary search by ObjectId, matching `sha1_entry_pos`.
    pub fn is_promised(&self, oid: &ObjectId) -> Result<Option<u64>, Error> {
        self.with_mapped(|bytes| {
            let n = Self::entry_count(bytes);
            let mut lo = 0usize;
            let mut hi = n;
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                let entry = Self::entry_at(bytes, mid)?;
                match entry.oid.cmp(oid) {
                    std::cmp::Ordering::Equal => return Ok(Some(entry.size)),
                    std::cmp::Ordering::Less => lo = mid + 1,
                    std::cmp::Ordering::Greater => hi = mid,
                }
            }
            Ok(None)
        })?
    }

    pub fn iter(&self) -> Result<Vec<PromisedEntry>, Error> {
        self.with_mapped(|bytes| {
            (0..Self::entry_count(bytes))
                .map(|i| Self::entry_at(bytes, i))
                .collect::<Result<Vec<_>, _>>()
        })?
    }

    /// Stream-merges the existing entries with `new_entries`, writes the
    /// deduplicated, sorted union to a temp file, and atomically renames
    /// it over the canonical path. Invalidates the mmap handle so the
    /// next read reopens the new file.
    pub fn merge(&self, new_entries: &[PromisedEntry]) -> Result<(), Error> {
        let existing = self.iter()?;
        let mut new_entries = new_entries.to_vec();
        new_entries.sort_by(|a, b| a.oid.cmp(&b.oid));
        let mut merged = Vec::with_capacity(existing.len() + new_entries.len());
        let (mut i, mut j) = (0, 0);
        while i < existing.len() && j < new_entries.len() {
            match existing[i].oid.cmp(&new_entries[j].oid) {
                std::cmp::Ordering::Less => {
                    merged.push(existing[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(new_entries[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push(existing[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&existing[i..]);
        merged.extend_from_slice(&new_entries[j..]);

        let mut buf = Vec::with_capacity(merged.len() * ENTRY_SIZE);
        for entry in &merged {
            entry.encode(&mut buf);
        }

        let tmp_path = tmp_path_for(&self.path);
        {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            tmp.write_all(&buf)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        *self.mmap.borrow_mut() = None;
        Ok(())
    }

    /// Decodes a varint-prefixed-count, `(raw oid, varint size)` stream
    /// into entries ready for [`merge`], matching `merge_promises`'s
    /// wire decoding. Does not implement pkt-line framing itself — that
    /// is the transport's concern.
    pub fn decode_merge_stream(mut bytes: &[u8]) -> Result<Vec<PromisedEntry>, Error> {
        let mut out = Vec::new();
        while !bytes.is_empty() {
            if bytes.len() < OID_SIZE {
                break;
            }
            let oid = ObjectId::try_from(&bytes[..OID_SIZE])?;
            bytes = &bytes[OID_SIZE..];
            let (size, rest) = decode_varint(bytes);
            bytes = rest;
            out.push(PromisedEntry { oid, size });
        }
        out.sort_by(|a, b| a.oid.cmp(&b.oid));
        Ok(out)
    }

    /// Of `oids`, selects those this registry has a promise for and
    /// hands their hex identities to the external fetcher configured via
    /// `core.promisedblobcommand`, one per line on its stdin. On success,
    /// invokes `reprobe` so the object store notices newly-written packs.
    pub fn request(
        &self,
        oids: &[ObjectId],
        command: &str,
        reprobe: impl FnOnce() -> Result<(), Error>,
    ) -> Result<(), Error> {
        let mut wanted = Vec::new();
        for oid in oids {
            if self.is_promised(oid)?.is_some() {
                wanted.push(*oid);
            }
        }
        if wanted.is_empty() {
            return Ok(());
        }

        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .spawn()?;
        {
            let stdin = child.stdin.as_mut().expect("piped stdin");
            for oid in &wanted {
                writeln!(stdin, "{}", oid.to_hex())?;
            }
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(Error::FetcherFailed(status));
        }
        reprobe()
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn decode_varint(bytes: &[u8]) -> (u64, &[u8]) {
    let mut value: u64 = 0;
    let mut shift = 0;
    let mut idx = 0;
    while idx < bytes.len() {
        let byte = bytes[idx];
        value |= u64::from(byte & 0x7f) << shift;
        idx += 1;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    (value, &bytes[idx..])
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn oid(byte: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        ObjectId::try_from(&bytes[..]).unwrap()
    }

    #[test]
    fn empty_registry_has_no_promises() {
        let dir = tempdir().unwrap();
        let reg = PromisedRegistry::open(dir.path().join("promised")).unwrap();
        assert_eq!(reg.is_promised(&oid(1)).unwrap(), None);
    }

    #[test]
    fn merge_then_lookup_round_trips_and_stays_sorted() {
        let dir = tempdir().unwrap();
        let reg = PromisedRegistry::open(dir.path().join("promised")).unwrap();
        reg.merge(&[
            PromisedEntry { oid: oid(5), size: 10 },
            PromisedEntry { oid: oid(1), size: 20 },
        ])
        .unwrap();
        assert_eq!(reg.is_promised(&oid(1)).unwrap(), Some(20));
        assert_eq!(reg.is_promised(&oid(5)).unwrap(), Some(10));
        assert_eq!(reg.is_promised(&oid(9)).unwrap(), None);

        let entries = reg.iter().unwrap();
        assert!(entries.windows(2).all(|w| w[0].oid < w[1].oid));
    }

    #[test]
    fn merge_is_idempotent_on_duplicate_entries() {
        let dir = tempdir().unwrap();
        let reg = PromisedRegistry::open(dir.path().join("promised")).unwrap();
        reg.merge(&[PromisedEntry { oid: oid(1), size: 5 }]).unwrap();
        reg.merge(&[PromisedEntry { oid: oid(1), size: 5 }]).unwrap();
        assert_eq!(reg.iter().unwrap().len(), 1);
    }

    #[test]
    fn rejects_corrupt_file_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("promised");
        fs::write(&path, [0u8; 7]).unwrap();
        assert!(matches!(
            PromisedRegistry::open(&path),
            Err(Error::Corrupt { .. })
        ));
    }

    #[test]
    fn varint_stream_decodes_size_and_sorts_by_oid() {
        let mut stream = Vec::new();
        stream.extend_from_slice(oid(5).as_bytes());
        stream.push(0x80); // 0 with continuation...
        stream.push(0x01); // ...then 1 << 7 = 128
        stream.extend_from_slice(oid(1).as_bytes());
        stream.push(0x0a); // 10, no continuation

        let entries = PromisedRegistry::decode_merge_stream(&stream).unwrap();
        assert_eq!(entries[0].oid, oid(1));
        assert_eq!(entries[0].size, 10);
        assert_eq!(entries[1].oid, oid(5));
        assert_eq!(entries[1].size, 128);
    }
}
