//! A link to a distribution as it appears in a requirements file, and the coarser equivalence
//! relation used to decide whether two spellings point to the same artifact.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::{LazyLock, Mutex};

use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

use pipreq_filename::splitext;
use pipreq_hash::Hashes;

pub use crate::split::{parse_qs, strip_auth, unquote, SplitUrl};
pub use crate::vcs::{get_url_scheme, is_url, VCS_ALL_SCHEMES, VCS_BACKENDS};

mod split;
mod vcs;

/// Digest algorithms recognized in a `#algo=digest` fragment.
pub const SUPPORTED_HASHES: [&str; 6] = ["sha1", "sha224", "sha384", "sha256", "sha512", "md5"];

static EGG_FRAGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[#&]egg=([^&]*)").unwrap());
static SUBDIRECTORY_FRAGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[#&]subdirectory=([^&]*)").unwrap());
static HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(sha1|sha224|sha384|sha256|sha512|md5)=([a-f0-9]+)").unwrap());

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("You can only turn file: urls into filenames (not {0:?})")]
    NotAFileUrl(String),
    #[error("non-local file URIs are not supported on this platform: {0:?}")]
    NonLocalFileUrl(String),
}

/// A URL or path to a distribution, kept exactly as written.
///
/// Identity (equality, ordering, hashing) is the raw string. Use [`links_equivalent`] to compare
/// two links loosely.
#[derive(Debug, Clone)]
pub struct Link {
    url: String,
    parsed: SplitUrl,
}

impl Link {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let parsed = SplitUrl::new(&url);
        Self { url, parsed }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn scheme(&self) -> &str {
        &self.parsed.scheme
    }

    /// The network location, including any `user:password@`.
    pub fn netloc(&self) -> &str {
        &self.parsed.netloc
    }

    /// The percent-decoded path.
    pub fn path(&self) -> String {
        unquote(&self.parsed.path).into_owned()
    }

    /// The last path segment, or the host if the path has none.
    pub fn filename(&self) -> String {
        let path = self.path();
        let path = path.trim_end_matches('/');
        let name = path.rsplit('/').next().unwrap_or_default();
        if name.is_empty() {
            return strip_auth(self.netloc()).to_string();
        }
        unquote(name).into_owned()
    }

    /// The local path of a `file:` link.
    pub fn file_path(&self) -> Result<PathBuf, LinkError> {
        url_to_path(&self.url)
    }

    /// The basename of the path split into stem and extension.
    pub fn splitext(&self) -> (String, String) {
        let path = self.path();
        let path = path.trim_end_matches('/');
        let basename = path.rsplit('/').next().unwrap_or_default();
        let (stem, ext) = splitext(basename);
        (stem.to_string(), ext.to_string())
    }

    pub fn ext(&self) -> String {
        self.splitext().1
    }

    pub fn url_without_fragment(&self) -> String {
        SplitUrl {
            fragment: String::new(),
            ..self.parsed.clone()
        }
        .unsplit()
    }

    /// The `egg=` value, i.e. the project name (and possibly extras) of a VCS or path link.
    pub fn egg_fragment(&self) -> Option<&str> {
        EGG_FRAGMENT_RE
            .captures(&self.url)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
    }

    pub fn subdirectory_fragment(&self) -> Option<&str> {
        SUBDIRECTORY_FRAGMENT_RE
            .captures(&self.url)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
    }

    /// The digest of an embedded `algo=digest`.
    pub fn hash(&self) -> Option<&str> {
        HASH_RE
            .captures(&self.url)
            .and_then(|captures| captures.get(2))
            .map(|m| m.as_str())
    }

    /// The algorithm of an embedded `algo=digest`.
    pub fn hash_name(&self) -> Option<&str> {
        HASH_RE
            .captures(&self.url)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
    }

    /// The last path segment of the URL without query and fragment, for messages.
    pub fn show_url(&self) -> &str {
        let url = self.url.split('#').next().unwrap_or_default();
        let url = url.split('?').next().unwrap_or_default();
        url.rsplit('/').next().unwrap_or_default()
    }

    pub fn is_file(&self) -> bool {
        self.scheme() == "file"
    }

    pub fn is_wheel(&self) -> bool {
        self.ext() == ".whl"
    }

    pub fn is_vcs(&self) -> bool {
        VCS_ALL_SCHEMES.contains(&self.scheme())
    }

    pub fn has_hash(&self) -> bool {
        self.hash_name().is_some()
    }

    /// Whether the link carries a hash that the given hashes allow.
    pub fn is_hash_allowed(&self, hashes: Option<&Hashes>) -> bool {
        let (Some(hashes), Some(hash_name), Some(hash)) = (hashes, self.hash_name(), self.hash())
        else {
            return false;
        };
        hashes.is_hash_allowed(hash_name, hash)
    }
}

impl Display for Link {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Link {}

impl Hash for Link {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

impl PartialOrd for Link {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Link {
    fn cmp(&self, other: &Self) -> Ordering {
        self.url.cmp(&other.url)
    }
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.url)
    }
}

/// Convert a `file:` URL to a local path.
///
/// An empty host and `localhost` both mean this machine; other hosts are only supported as UNC
/// shares on Windows.
pub fn url_to_path(url: &str) -> Result<PathBuf, LinkError> {
    let parsed = SplitUrl::new(url);
    if parsed.scheme != "file" {
        return Err(LinkError::NotAFileUrl(url.to_string()));
    }

    let netloc = if parsed.netloc.is_empty() || parsed.netloc == "localhost" {
        String::new()
    } else if cfg!(windows) {
        format!(r"\\{}", parsed.netloc)
    } else {
        return Err(LinkError::NonLocalFileUrl(url.to_string()));
    };

    let path = unquote(&format!("{netloc}{}", parsed.path)).into_owned();

    // `/C:/Users/foo` is `C:/Users/foo` on Windows.
    if cfg!(windows) && netloc.is_empty() {
        let bytes = path.as_bytes();
        if bytes.len() >= 3
            && bytes[0] == b'/'
            && bytes[1].is_ascii_alphabetic()
            && (&path[2..] == ":" || path[2..].starts_with(":/"))
        {
            return Ok(PathBuf::from(&path[1..]));
        }
    }
    Ok(PathBuf::from(path))
}

/// The parts of a link that matter for equivalence.
///
/// Drops auth, compares the query as a multi-map, and keeps only the `subdirectory` and hash
/// fragments. In the spirit of a canonical URL, this is only ever compared, never fetched.
#[derive(Debug, PartialEq, Eq)]
struct CleanLink {
    parsed: SplitUrl,
    query: BTreeMap<String, Vec<String>>,
    subdirectory: String,
    hashes: BTreeMap<String, String>,
}

impl CleanLink {
    fn new(link: &Link) -> Self {
        let mut netloc = strip_auth(link.netloc()).to_string();
        // An empty host in `file:` means localhost.
        if link.scheme() == "file" && netloc.is_empty() {
            netloc = "localhost".to_string();
        }

        let fragment = parse_qs(&link.parsed.fragment);
        if fragment.contains_key("egg") {
            debug!("Ignoring egg= fragment in {link}");
        }
        let subdirectory = fragment
            .get("subdirectory")
            .and_then(|values| values.first())
            .cloned()
            .unwrap_or_default();
        let hashes = SUPPORTED_HASHES
            .iter()
            .filter_map(|name| {
                let digest = fragment.get(*name)?.first()?;
                Some(((*name).to_string(), digest.clone()))
            })
            .collect();

        Self {
            parsed: SplitUrl {
                netloc,
                query: String::new(),
                fragment: String::new(),
                ..link.parsed.clone()
            },
            query: parse_qs(&link.parsed.query),
            subdirectory,
            hashes,
        }
    }
}

static EQUIVALENCE_CACHE: LazyLock<Mutex<FxHashMap<(String, String), bool>>> =
    LazyLock::new(Mutex::default);

/// Whether two links likely point to the same distribution.
///
/// Auth, `egg=` and unrecognized fragments are ignored, and query keys may come in any order (the
/// order of values under one key still matters). Results are cached for the life of the process.
pub fn links_equivalent(link1: &Link, link2: &Link) -> bool {
    let key = if link1.url <= link2.url {
        (link1.url.clone(), link2.url.clone())
    } else {
        (link2.url.clone(), link1.url.clone())
    };
    if let Ok(cache) = EQUIVALENCE_CACHE.lock() {
        if let Some(equivalent) = cache.get(&key) {
            return *equivalent;
        }
    }
    let equivalent = CleanLink::new(link1) == CleanLink::new(link2);
    if let Ok(mut cache) = EQUIVALENCE_CACHE.lock() {
        cache.insert(key, equivalent);
    }
    equivalent
}

#[cfg(test)]
mod tests;
