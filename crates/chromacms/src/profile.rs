//! ICC profile handles with memoized content hashing

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;

use memmap2::Mmap;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::parser::{parse_header, ColorSpace, IccHeader};

/// Backing storage for profile bytes
enum ProfileBytes {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl ProfileBytes {
    fn as_slice(&self) -> &[u8] {
        match self {
            ProfileBytes::Owned(v) => v,
            ProfileBytes::Mapped(m) => m,
        }
    }
}

/// An opaque color space descriptor
///
/// Holds the raw profile bytes (owned, or memory-mapped straight from
/// disk) plus the parsed header. The content hash is computed at most
/// once per profile and reused by every cache lookup.
pub struct IccProfile {
    bytes: ProfileBytes,
    header: IccHeader,
    hash: OnceLock<u64>,
}

impl IccProfile {
    /// Construct a profile from owned bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let header = parse_header(&bytes)?;
        Ok(IccProfile {
            bytes: ProfileBytes::Owned(bytes),
            header,
            hash: OnceLock::new(),
        })
    }

    /// Memory-map a profile from a file on disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::ProfileUnavailable(format!("{}: {}", path.as_ref().display(), e))
        })?;
        // Safety: the mapping is read-only and the profile file is not
        // expected to change underneath a running render.
        let map = unsafe { Mmap::map(&file)? };
        let header = parse_header(&map)?;
        Ok(IccProfile {
            bytes: ProfileBytes::Mapped(map),
            header,
            hash: OnceLock::new(),
        })
    }

    /// Raw profile bytes
    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// Parsed header fields
    pub fn header(&self) -> &IccHeader {
        &self.header
    }

    /// Data color space of the profile
    pub fn color_space(&self) -> ColorSpace {
        self.header.color_space
    }

    /// Number of color channels on the profile's device side
    pub fn num_comps(&self) -> usize {
        self.header.color_space.num_comps()
    }

    /// Content hash of the profile bytes, memoized on first use
    ///
    /// A Sha256 digest of the full byte stream folded to 64 bits by
    /// XORing the two halves of its first 16 bytes. Two profiles with
    /// equal bytes always hash equal, across processes and runs.
    pub fn content_hash(&self) -> u64 {
        *self.hash.get_or_init(|| fold_digest(self.bytes.as_slice()))
    }
}

impl fmt::Debug for IccProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IccProfile")
            .field("color_space", &self.header.color_space)
            .field("pcs", &self.header.pcs)
            .field("len", &self.bytes.as_slice().len())
            .finish()
    }
}

fn fold_digest(data: &[u8]) -> u64 {
    let digest = Sha256::digest(data);
    let word1 = u64::from_le_bytes(digest[0..8].try_into().expect("8-byte slice"));
    let word2 = u64::from_le_bytes(digest[8..16].try_into().expect("8-byte slice"));
    word1 ^ word2
}
