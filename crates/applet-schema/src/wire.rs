//! `.pak` container format.
//!
//! ```text
//! +--------+---------+------+---------------------------+
//! | "APAK" | version | kind | zstd(postcard(body))      |
//! | 4 B    | 1 B     | 1 B  | ...                       |
//! +--------+---------+------+---------------------------+
//! ```
//!
//! `kind` is `0` for a single applet and `1` for a solution envelope, so the
//! loader can tell them apart without decompressing the body.

use crate::types::{PackageArtifact, PackageMetadata, SolutionPackage};
use thiserror::Error;

/// Magic bytes at the start of every package file.
pub const PAK_MAGIC: [u8; 4] = *b"APAK";

/// Current container version.
pub const PAK_FORMAT_VERSION: u8 = 1;

const KIND_APPLET: u8 = 0;
const KIND_SOLUTION: u8 = 1;
const HEADER_LEN: usize = 6;
const ZSTD_LEVEL: i32 = 3;

/// Errors decoding or encoding a package file.
#[derive(Error, Debug)]
pub enum WireError {
    /// File does not start with the package magic.
    #[error("not an applet package (bad magic)")]
    BadMagic,

    /// Container version this build does not understand.
    #[error("unsupported package format version {0}")]
    UnsupportedVersion(u8),

    /// Unknown package kind byte.
    #[error("unknown package kind {0}")]
    UnknownKind(u8),

    /// zstd layer failed.
    #[error("failed to (de)compress package body: {0}")]
    Compression(#[from] std::io::Error),

    /// postcard layer failed.
    #[error("failed to (de)serialize package body: {0}")]
    Codec(#[from] postcard::Error),
}

/// Either kind of package file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageFile {
    /// A single applet.
    Applet(PackageArtifact),
    /// A solution envelope with its included applets.
    Solution(SolutionPackage),
}

impl PackageFile {
    /// Metadata of the outermost package.
    pub fn meta(&self) -> &PackageMetadata {
        match self {
            Self::Applet(a) => &a.meta,
            Self::Solution(s) => &s.meta,
        }
    }

    /// True for solution envelopes.
    pub fn is_solution(&self) -> bool {
        matches!(self, Self::Solution(_))
    }

    /// Encode into the container format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or compression fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        match self {
            Self::Applet(a) => encode_applet(a),
            Self::Solution(s) => encode_solution(s),
        }
    }

    /// Decode from the container format.
    ///
    /// # Errors
    ///
    /// Returns an error for a bad header, corrupt compression, or an invalid body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let kind = peek_kind(bytes)?;
        let body = zstd::decode_all(&bytes[HEADER_LEN..])?;
        match kind {
            KIND_APPLET => Ok(Self::Applet(postcard::from_bytes(&body)?)),
            KIND_SOLUTION => Ok(Self::Solution(postcard::from_bytes(&body)?)),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

/// Encode a single applet without wrapping it in a [`PackageFile`].
///
/// # Errors
///
/// Returns an error if serialization or compression fails.
pub fn encode_applet(artifact: &PackageArtifact) -> Result<Vec<u8>, WireError> {
    encode(KIND_APPLET, &postcard::to_allocvec(artifact)?)
}

/// Encode a solution envelope without wrapping it in a [`PackageFile`].
///
/// # Errors
///
/// Returns an error if serialization or compression fails.
pub fn encode_solution(solution: &SolutionPackage) -> Result<Vec<u8>, WireError> {
    encode(KIND_SOLUTION, &postcard::to_allocvec(solution)?)
}

fn encode(kind: u8, body: &[u8]) -> Result<Vec<u8>, WireError> {
    let compressed = zstd::encode_all(body, ZSTD_LEVEL)?;

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(&PAK_MAGIC);
    out.push(PAK_FORMAT_VERSION);
    out.push(kind);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Validate the header and return the kind byte.
fn peek_kind(bytes: &[u8]) -> Result<u8, WireError> {
    if bytes.len() < HEADER_LEN || bytes[0..4] != PAK_MAGIC {
        return Err(WireError::BadMagic);
    }
    if bytes[4] != PAK_FORMAT_VERSION {
        return Err(WireError::UnsupportedVersion(bytes[4]));
    }
    match bytes[5] {
        k @ (KIND_APPLET | KIND_SOLUTION) => Ok(k),
        other => Err(WireError::UnknownKind(other)),
    }
}

/// True if `bytes` carries a solution envelope header.
pub fn is_solution_file(bytes: &[u8]) -> bool {
    matches!(peek_kind(bytes), Ok(KIND_SOLUTION))
}
