//! URL splitting with the leniency of Python's `urllib.parse`.
//!
//! Requirements files contain things that are not URLs by any standard (`git+git@host:repo`,
//! bare relative paths, `file:` URLs with `..` in them), so links keep the raw string and split
//! it into the five components without validating or normalizing any of them.

use std::borrow::Cow;
use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;

/// Schemes for which an empty network location is still rendered as `//`.
const USES_NETLOC: &[&str] = &[
    "ftp", "http", "gopher", "nntp", "telnet", "imap", "wais", "file", "mms", "https", "shttp",
    "snews", "prospero", "rtsp", "rtspu", "rsync", "svn", "svn+ssh", "sftp", "nfs", "git",
    "git+ssh", "ws", "wss",
];

/// The `scheme://netloc/path?query#fragment` components of a URL-ish string.
///
/// The scheme is lowercased; everything else is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SplitUrl {
    pub scheme: String,
    pub netloc: String,
    pub path: String,
    pub query: String,
    pub fragment: String,
}

impl SplitUrl {
    pub fn new(url: &str) -> Self {
        let url: String = url
            .trim_start_matches(|c: char| c <= ' ')
            .chars()
            .filter(|c| !matches!(c, '\t' | '\r' | '\n'))
            .collect();
        let mut rest = url.as_str();

        let mut scheme = String::new();
        if let Some((candidate, after)) = rest.split_once(':') {
            if is_scheme(candidate) {
                scheme = candidate.to_ascii_lowercase();
                rest = after;
            }
        }

        let mut netloc = "";
        if let Some(after_slashes) = rest.strip_prefix("//") {
            let end = after_slashes
                .find(['/', '?', '#'])
                .unwrap_or(after_slashes.len());
            netloc = &after_slashes[..end];
            rest = &after_slashes[end..];
        }

        let (rest, fragment) = rest.split_once('#').unwrap_or((rest, ""));
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

        Self {
            scheme,
            netloc: netloc.to_string(),
            path: path.to_string(),
            query: query.to_string(),
            fragment: fragment.to_string(),
        }
    }

    /// Reassemble the components, the inverse of [`SplitUrl::new`] up to redundant delimiters.
    pub fn unsplit(&self) -> String {
        let mut url = self.path.clone();
        let needs_netloc = !self.netloc.is_empty()
            || (!self.scheme.is_empty()
                && USES_NETLOC.contains(&self.scheme.as_str())
                && !url.starts_with("//"));
        if needs_netloc {
            if !url.is_empty() && !url.starts_with('/') {
                url.insert(0, '/');
            }
            url = format!("//{}{url}", self.netloc);
        }
        if !self.scheme.is_empty() {
            url = format!("{}:{url}", self.scheme);
        }
        if !self.query.is_empty() {
            url.push('?');
            url.push_str(&self.query);
        }
        if !self.fragment.is_empty() {
            url.push('#');
            url.push_str(&self.fragment);
        }
        url
    }
}

/// A scheme starts with an ASCII letter, followed by letters, digits, `+`, `-` or `.`.
fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Decode `%XX` escapes, replacing invalid UTF-8 with the replacement character.
pub fn unquote(s: &str) -> Cow<'_, str> {
    percent_decode_str(s).decode_utf8_lossy()
}

/// Parse an `a=1&b=2` query into a multi-map.
///
/// Pairs without `=` or with an empty value are dropped, `+` decodes to a space. The order of
/// values under one key is preserved.
pub fn parse_qs(query: &str) -> BTreeMap<String, Vec<String>> {
    let mut parsed: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in query.split('&') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let name = unquote(&name.replace('+', " ")).into_owned();
        let value = unquote(&value.replace('+', " ")).into_owned();
        parsed.entry(name).or_default().push(value);
    }
    parsed
}

/// Remove `user:password@` from a network location.
pub fn strip_auth(netloc: &str) -> &str {
    netloc.rsplit_once('@').map_or(netloc, |(_, host)| host)
}
