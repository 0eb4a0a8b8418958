//! Known-good archive digests, as collected from `--hash` options and link fragments, and their
//! verification against archive contents.

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::ops::BitAnd;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

pub use crate::hasher::{HashAlgorithm, Hasher};

mod hasher;

/// The hash used when reporting the digest of an archive that has none.
pub const FAVORITE_HASH: &str = "sha256";

/// Hashes that are considered strong enough to pin an archive.
pub const STRONG_HASHES: [&str; 3] = ["sha256", "sha384", "sha512"];

/// Chunk size used when streaming a file through the hashers.
const CHUNK_SIZE: usize = 8 * 1024;

/// A failure to verify a package against known-good hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// A hash was needed for a requirement but none was supplied.
    #[error(
        "Hashes are required, but none were given for this requirement; the archive's sha256 is {0}"
    )]
    Missing(String),
    /// None of the computed digests is allowed.
    #[error("{}", format_mismatch(.allowed, .gots))]
    Mismatch {
        allowed: BTreeMap<String, Vec<String>>,
        gots: BTreeMap<String, String>,
    },
    /// A requirement had a hash specified but was not pinned to a specific version.
    #[error("In --require-hashes mode, all requirements must have their versions pinned with ==: {0}")]
    Unpinned(String),
    /// Version control checkouts can't be hashed.
    #[error("Can't verify hashes for this requirement because we don't have a way to hash version control repositories: {0}")]
    VcsUnsupported(String),
    /// Local directories can't be hashed.
    #[error("Can't verify hashes for this file:// requirement because it points to a directory: {0}")]
    DirectoryUrlUnsupported(String),
    #[error("Unknown hash name: {0}")]
    UnknownAlgorithm(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Render the expected/got comparison of a mismatch, aligned per algorithm.
fn format_mismatch(
    allowed: &BTreeMap<String, Vec<String>>,
    gots: &BTreeMap<String, String>,
) -> String {
    let mut lines = vec!["Hashes do not match the archive:".to_string()];
    for (algorithm, expecteds) in allowed {
        for (index, expected) in expecteds.iter().enumerate() {
            let prefix = if index == 0 { "Expected" } else { "      or" };
            lines.push(format!("    {prefix} {algorithm} {expected}"));
        }
        if let Some(got) = gots.get(algorithm) {
            lines.push(format!("         Got {algorithm} {got}"));
        }
    }
    lines.join("\n")
}

/// A set of allowed hex digests per algorithm name.
///
/// Digests are kept sorted so that equality doesn't depend on the order they were given in. An
/// empty set allows anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Hashes(BTreeMap<String, Vec<String>>);

impl Hashes {
    /// Build a set of allowed digests, merging repeated algorithms.
    pub fn new<A, D>(allowed: impl IntoIterator<Item = (A, D)>) -> Self
    where
        A: Into<String>,
        D: IntoIterator<Item = String>,
    {
        let mut hashes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (algorithm, digests) in allowed {
            hashes.entry(algorithm.into()).or_default().extend(digests);
        }
        for digests in hashes.values_mut() {
            digests.sort();
        }
        Self(hashes)
    }

    /// The allowed digests per algorithm.
    pub fn allowed(&self) -> &BTreeMap<String, Vec<String>> {
        &self.0
    }

    /// Whether no digest is known at all, i.e. anything is allowed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn digest_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Whether the given hex digest is allowed.
    pub fn is_hash_allowed(&self, hash_name: &str, hex_digest: &str) -> bool {
        self.0
            .get(hash_name)
            .is_some_and(|digests| digests.iter().any(|digest| digest == hex_digest))
    }

    /// Check the allowed digests against the digests built from the given chunks of data.
    ///
    /// Succeeds if any algorithm's digest is allowed.
    pub fn check_against_chunks<I>(&self, chunks: I) -> Result<(), HashError>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let gots = digest_chunks(self.0.keys(), chunks.into_iter().map(Ok))?;
        self.verify(gots)
    }

    /// Check the allowed digests against the contents of a reader.
    pub fn check_against_file(&self, file: impl Read) -> Result<(), HashError> {
        let gots = digest_chunks(self.0.keys(), ReadChunks::new(file))?;
        self.verify(gots)
    }

    pub fn check_against_path(&self, path: impl AsRef<Path>) -> Result<(), HashError> {
        self.check_against_file(fs_err::File::open(path.as_ref())?)
    }

    fn verify(&self, gots: BTreeMap<String, String>) -> Result<(), HashError> {
        let matched = gots
            .iter()
            .any(|(algorithm, got)| self.is_hash_allowed(algorithm, got));
        if matched {
            Ok(())
        } else {
            Err(HashError::Mismatch {
                allowed: self.0.clone(),
                gots,
            })
        }
    }
}

impl BitAnd for &Hashes {
    type Output = Hashes;

    /// Only digests allowed by both sides are allowed. An empty side allows everything.
    fn bitand(self, other: Self) -> Hashes {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let allowed = other
            .0
            .iter()
            .filter_map(|(algorithm, values)| {
                let ours = self.0.get(algorithm)?;
                let values = values
                    .iter()
                    .filter(|value| ours.contains(value))
                    .cloned()
                    .collect::<Vec<_>>();
                Some((algorithm.clone(), values))
            })
            .collect();
        Hashes(allowed)
    }
}

/// Stands in for [`Hashes`] when hashes are required but a requirement has none.
///
/// Checking always fails, reporting the archive's [`FAVORITE_HASH`] so it can be pinned.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingHashes;

impl MissingHashes {
    pub fn check_against_chunks<I>(&self, chunks: I) -> Result<(), HashError>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let gots = digest_chunks([FAVORITE_HASH], chunks.into_iter().map(Ok))?;
        Err(Self::missing(gots))
    }

    pub fn check_against_file(&self, file: impl Read) -> Result<(), HashError> {
        let gots = digest_chunks([FAVORITE_HASH], ReadChunks::new(file))?;
        Err(Self::missing(gots))
    }

    pub fn check_against_path(&self, path: impl AsRef<Path>) -> Result<(), HashError> {
        self.check_against_file(fs_err::File::open(path.as_ref())?)
    }

    fn missing(mut gots: BTreeMap<String, String>) -> HashError {
        HashError::Missing(gots.remove(FAVORITE_HASH).unwrap_or_default())
    }
}

/// The hex digest of everything read from `file`.
pub fn hash_file(algorithm: HashAlgorithm, file: impl Read) -> Result<String, HashError> {
    let mut hasher = Hasher::from(algorithm);
    for chunk in ReadChunks::new(file) {
        hasher.update(&chunk?);
    }
    Ok(hasher.finalize())
}

/// The hex digest of the file at `path`.
pub fn hash_path(algorithm: HashAlgorithm, path: impl AsRef<Path>) -> Result<String, HashError> {
    hash_file(algorithm, fs_err::File::open(path.as_ref())?)
}

/// Compute the hex digest of every named algorithm in a single pass over the chunks.
fn digest_chunks<A, C>(
    algorithms: impl IntoIterator<Item = A>,
    chunks: impl Iterator<Item = io::Result<C>>,
) -> Result<BTreeMap<String, String>, HashError>
where
    A: AsRef<str>,
    C: AsRef<[u8]>,
{
    let mut hashers = algorithms
        .into_iter()
        .map(|name| {
            let name = name.as_ref();
            let algorithm = HashAlgorithm::from_str(name)?;
            Ok((name.to_string(), Hasher::from(algorithm)))
        })
        .collect::<Result<Vec<_>, HashError>>()?;

    for chunk in chunks {
        let chunk = chunk?;
        for (_, hasher) in &mut hashers {
            hasher.update(chunk.as_ref());
        }
    }

    Ok(hashers
        .into_iter()
        .map(|(name, hasher)| (name, hasher.finalize()))
        .collect())
}

/// Yields pieces of data from a reader until EOF.
struct ReadChunks<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: Read> ReadChunks<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0; CHUNK_SIZE],
        }
    }
}

impl<R: Read> Iterator for ReadChunks<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.reader.read(&mut self.buf) {
                Ok(0) => None,
                Ok(len) => Some(Ok(self.buf[..len].to_vec())),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => Some(Err(err)),
            };
        }
    }
}

#[cfg(test)]
mod tests;
