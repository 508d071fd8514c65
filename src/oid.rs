//! Content-addressed object identity.
//!
//! [`ObjectId`] wraps [`gix_hash::ObjectId`] rather than a bare `[u8; 20]`
//! so that the width of the digest is a property of the configured hash
//! kind (SHA-1 today) and never hard-coded in comparisons or parsing.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(gix_hash::ObjectId);

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid object id: {0}")]
    Decode(#[from] gix_hash::decode::Error),
    #[error("invalid object id length {len}, expected {expected}")]
    Length { len: usize, expected: usize },
}

impl ObjectId {
    /// The all-zero id, used as the `old_oid`/`new_oid` sentinel for
    /// "absent" (ref creation or deletion).
    pub fn null() -> Self {
        Self(gix_hash::ObjectId::null(gix_hash::Kind::Sha1))
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    pub fn from_hex(s: &str) -> Result<Self, ParseError> {
        Ok(Self(gix_hash::ObjectId::from_hex(s.as_bytes())?))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn len(&self) -> usize {
        self.0.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub(crate) fn into_gix(self) -> gix_hash::ObjectId {
        self.0
    }

    pub(crate) fn as_gix(&self) -> &gix_hash::ObjectId {
        &self.0
    }
}

impl From<gix_hash::ObjectId> for ObjectId {
    fn from(oid: gix_hash::ObjectId) -> Self {
        Self(oid)
    }
}

impl From<ObjectId> for gix_hash::ObjectId {
    fn from(oid: ObjectId) -> Self {
        oid.0
    }
}

impl TryFrom<&[u8]> for ObjectId {
    type Error = ParseError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != gix_hash::Kind::Sha1.len_in_bytes() {
            return Err(ParseError::Length {
                len: bytes.len(),
                expected: gix_hash::Kind::Sha1.len_in_bytes(),
            });
        }
        Ok(Self(gix_hash::ObjectId::from_bytes_or_panic(bytes)))
    }
}

impl FromStr for ObjectId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
