//! Turning the text of a requirement line into an [`InstallRequirement`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::path::{Path, MAIN_SEPARATOR};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};
use tracing::debug;

use pipreq_filename::{is_archive_file, WheelFilename};
use pipreq_hash::{HashError, Hashes, MissingHashes};
use pipreq_link::{is_url, Link, VCS_BACKENDS};
use pipreq_normalize::safe_extra;
use pipreq_pep440::{Operator, VersionSpecifiers};
use pipreq_pep508::{MarkerEnvironment, MarkerTree, Requirement};

use crate::error::{InstallationError, RequirementHint};

static EXTRAS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+)(\[[^\]]+\])$").unwrap());
static EXTRAS_AFTER_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(~=|===|==|!=|<=|>=|<|>)\s*([^,;\s)]*\])").unwrap()
});

const OPERATORS: [&str; 8] = ["~=", "==", "!=", "<=", ">=", "<", ">", "==="];

/// A logical line of a requirements file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequirementLine {
    /// The first physical line of the logical line, starting at 1.
    pub line_number: usize,
    pub line: String,
    pub filename: String,
}

impl RequirementLine {
    pub fn new(line_number: usize, line: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            line_number,
            line: line.into(),
            filename: filename.into(),
        }
    }

    /// A snapshot of the line, with the file name only if asked for.
    pub fn to_dict(&self, include_filename: bool) -> serde_json::Value {
        LineRecord::new(self, include_filename, None).to_value()
    }
}

impl Display for RequirementLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "-r {} (line {})", self.filename, self.line_number)
    }
}

/// A line that could not be turned into a requirement, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRequirementLine {
    pub requirement_line: RequirementLine,
    pub error_message: String,
}

impl InvalidRequirementLine {
    pub fn to_dict(&self, include_filename: bool) -> serde_json::Value {
        LineRecord::new(
            &self.requirement_line,
            include_filename,
            Some(&self.error_message),
        )
        .to_value()
    }
}

#[derive(Serialize)]
struct LineRecord<'a> {
    line_number: usize,
    line: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

impl<'a> LineRecord<'a> {
    fn new(
        line: &'a RequirementLine,
        include_filename: bool,
        error_message: Option<&'a str>,
    ) -> Self {
        Self {
            line_number: line.line_number,
            line: &line.line,
            filename: include_filename.then_some(line.filename.as_str()),
            error_message,
        }
    }

    fn to_value(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "line_number": self.line_number,
            "line": self.line,
        });
        if let Some(record) = value.as_object_mut() {
            if let Some(filename) = self.filename {
                record.insert("filename".to_string(), filename.into());
            }
            if let Some(error_message) = self.error_message {
                record.insert("error_message".to_string(), error_message.into());
            }
        }
        value
    }
}

/// The per-requirement options of a non-editable requirement line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementOptions {
    pub install_options: Vec<String>,
    pub global_options: Vec<String>,
    pub hashes: BTreeMap<String, Vec<Option<String>>>,
}

/// What a requirement string breaks down into before it becomes an [`InstallRequirement`].
#[derive(Debug, Clone, Default)]
pub struct RequirementParts {
    pub requirement: Option<Requirement>,
    pub link: Option<Link>,
    pub markers: Option<MarkerTree>,
    pub extras: BTreeSet<String>,
}

/// Split a trailing `[extras]` off a path or URL.
pub(crate) fn strip_extras(path: &str) -> (&str, Option<&str>) {
    match EXTRAS_RE.captures(path) {
        Some(captures) => {
            let (Some(path), Some(extras)) = (captures.get(1), captures.get(2)) else {
                return (path, None);
            };
            (path.as_str(), Some(extras.as_str()))
        }
        None => (path, None),
    }
}

fn convert_extras(extras: Option<&str>) -> Result<BTreeSet<String>, InstallationError> {
    let Some(extras) = extras else {
        return Ok(BTreeSet::new());
    };
    let placeholder = Requirement::from_str(&format!("placeholder{}", extras.to_lowercase()))?;
    Ok(placeholder.extras.into_iter().collect())
}

/// Whether a string looks like a filesystem path: it has a path separator or starts with `.`.
pub(crate) fn looks_like_path(name: &str) -> bool {
    name.contains(MAIN_SEPARATOR) || (cfg!(windows) && name.contains('/')) || name.starts_with('.')
}

/// The path to use as a link, if `name` is a path or a local archive.
///
/// An archive name with an `@` whose first part doesn't look like a path is left to the
/// grammar as a `name @ url` requirement.
fn get_url_from_path<'a>(path: &'a str, name: &str) -> Option<&'a str> {
    if looks_like_path(name) {
        return Some(path);
    }
    if !is_archive_file(path) {
        return None;
    }
    if let Some((before, _)) = name.split_once('@') {
        if !looks_like_path(before) {
            return None;
        }
    }
    Some(path)
}

/// Split an editable requirement into its project name, URL and extras.
fn parse_editable(
    editable_req: &str,
) -> Result<(Option<String>, String, BTreeSet<String>), InstallationError> {
    let (url_no_extras, extras) = strip_extras(editable_req);

    let lowered = url_no_extras.to_lowercase();
    if lowered.starts_with("file:") || lowered.starts_with('.') {
        let name = Link::new(url_no_extras)
            .egg_fragment()
            .map(ToString::to_string);
        return Ok((name, url_no_extras.to_string(), convert_extras(extras)?));
    }

    let lowered = editable_req.to_lowercase();
    let url = match VCS_BACKENDS
        .iter()
        .find(|vcs| lowered.starts_with(&format!("{vcs}:")))
    {
        Some(vcs) => format!("{vcs}+{editable_req}"),
        None => editable_req.to_string(),
    };

    let link = Link::new(url.as_str());
    if !link.is_vcs() || !looks_like_path(&url) {
        return Err(InstallationError::InvalidEditable(editable_req.to_string()));
    }

    match link.egg_fragment() {
        Some(name) if !name.is_empty() => Ok((Some(name.to_string()), url, BTreeSet::new())),
        _ => Err(InstallationError::MissingEditableName(
            editable_req.to_string(),
        )),
    }
}

/// Parse an editable requirement, such as `-e git+https://host/repo.git#egg=name` or `-e ./dir`.
pub fn parse_req_from_editable(editable_req: &str) -> Result<RequirementParts, InstallationError> {
    let (name, url, extras) = parse_editable(editable_req)?;

    let requirement = match name {
        Some(name) => match Requirement::from_str(&name) {
            Ok(requirement) => Some(requirement),
            Err(err) => {
                debug!("Invalid editable name `{name}`: {err}");
                return Err(InstallationError::InvalidEditableName(name));
            }
        },
        None => None,
    };

    Ok(RequirementParts {
        requirement,
        link: Some(Link::new(url)),
        markers: None,
        extras,
    })
}

/// Parse a requirement string through the grammar, explaining common mistakes on failure.
fn parse_req_string(req_as_string: &str) -> Result<Requirement, InstallationError> {
    Requirement::from_str(req_as_string).map_err(|err| {
        debug!("Invalid requirement `{req_as_string}`: {err}");
        if let Some(captures) = EXTRAS_AFTER_VERSION_RE.captures(req_as_string) {
            return InstallationError::ExtrasAfterVersion(format!(
                "{}{}",
                &captures[1], &captures[2]
            ));
        }
        let hint = if req_as_string.contains(MAIN_SEPARATOR) {
            Some(RequirementHint::Path)
        } else if req_as_string.contains('=')
            && !OPERATORS.iter().any(|op| req_as_string.contains(op))
        {
            Some(RequirementHint::SingleEquals)
        } else {
            None
        };
        InstallationError::InvalidRequirement { hint, err }
    })
}

/// Parse a non-editable requirement: a name with specifiers, a URL, a local path or an archive.
pub fn parse_req_from_line(name: &str) -> Result<RequirementParts, InstallationError> {
    // Markers in a URL requirement must be separated by whitespace, since `;` is valid in URLs.
    let marker_sep = if is_url(name) { "; " } else { ";" };
    let (name, markers) = match name.split_once(marker_sep) {
        Some((name, markers)) => {
            let markers = markers.trim();
            let markers = if markers.is_empty() {
                None
            } else {
                Some(MarkerTree::from_str(markers)?)
            };
            (name, markers)
        }
        None => (name, None),
    };
    let name = name.trim();

    let mut extras_as_string = None;
    let link = if is_url(name) {
        Some(Link::new(name))
    } else {
        let (path, extras) = strip_extras(name);
        extras_as_string = extras;
        get_url_from_path(path, name).map(Link::new)
    };

    let (link, req_as_string) = match link {
        Some(mut link) => {
            // Relative file URLs.
            if link.scheme() == "file" && link.url().contains("../") {
                link = Link::new(link.path());
            }
            let req_as_string = if link.is_wheel() {
                let wheel = WheelFilename::from_str(&link.filename())?;
                Some(format!("{}=={}", wheel.name, wheel.version))
            } else {
                // Without an `egg=`, this is an unnamed requirement.
                link.egg_fragment().map(ToString::to_string)
            };
            (Some(link), req_as_string)
        }
        None => (None, Some(name.to_string())),
    };

    let extras = convert_extras(extras_as_string)?;
    let requirement = req_as_string
        .as_deref()
        .map(parse_req_string)
        .transpose()?;

    Ok(RequirementParts {
        requirement,
        link,
        markers,
        extras,
    })
}

/// A requirement found in a requirements file, ready to be resolved.
#[derive(Debug, Clone)]
pub struct InstallRequirement {
    /// The parsed requirement. Unnamed links and local editables without `egg=` have none.
    pub req: Option<Requirement>,
    pub requirement_line: RequirementLine,
    pub is_editable: bool,
    pub link: Option<Link>,
    pub markers: Option<MarkerTree>,
    pub extras: BTreeSet<String>,
    pub install_options: Vec<String>,
    pub global_options: Vec<String>,
    pub hash_options: BTreeMap<String, Vec<Option<String>>>,
    pub is_constraint: bool,
}

impl InstallRequirement {
    fn from_parts(
        parts: RequirementParts,
        requirement_line: RequirementLine,
        is_editable: bool,
        is_constraint: bool,
        options: RequirementOptions,
    ) -> Self {
        let RequirementParts {
            requirement: req,
            link,
            markers,
            extras,
        } = parts;

        let link = link.or_else(|| req.as_ref().and_then(Requirement::url).map(Link::new));
        let extras = if extras.is_empty() {
            req.iter()
                .flat_map(|req| req.extras.iter())
                .map(|extra| safe_extra(extra))
                .collect()
        } else {
            extras
        };
        let markers = markers.or_else(|| req.as_ref().and_then(|req| req.marker.clone()));

        Self {
            req,
            requirement_line,
            is_editable,
            link,
            markers,
            extras,
            install_options: options.install_options,
            global_options: options.global_options,
            hash_options: options.hashes,
            is_constraint,
        }
    }

    /// Build an editable requirement. Editables take no per-requirement options.
    pub fn from_editable(
        editable_req: &str,
        requirement_line: RequirementLine,
        is_constraint: bool,
    ) -> Result<Self, InstallationError> {
        let parts = parse_req_from_editable(editable_req)?;
        Ok(Self::from_parts(
            parts,
            requirement_line,
            true,
            is_constraint,
            RequirementOptions::default(),
        ))
    }

    /// Build a requirement from the requirement part of a line.
    pub fn from_line(
        name: &str,
        options: RequirementOptions,
        is_constraint: bool,
        requirement_line: RequirementLine,
    ) -> Result<Self, InstallationError> {
        let parts = parse_req_from_line(name)?;
        Ok(Self::from_parts(
            parts,
            requirement_line,
            false,
            is_constraint,
            options,
        ))
    }

    /// The project name as written.
    pub fn name(&self) -> Option<&str> {
        self.req.as_ref().map(|req| req.name.as_str())
    }

    pub fn specifier(&self) -> Option<&VersionSpecifiers> {
        self.req.as_ref().and_then(Requirement::specifier)
    }

    /// Whether the requirement has exactly one `==` or `===` clause.
    ///
    /// A wildcard `==1.*` counts as pinned.
    pub fn is_pinned(&self) -> bool {
        match self.specifier().map(|specifiers| &specifiers[..]) {
            Some([specifier]) => matches!(
                specifier.operator(),
                Operator::Equal | Operator::EqualStar | Operator::ExactEqual
            ),
            _ => false,
        }
    }

    pub fn is_wheel(&self) -> bool {
        self.link.as_ref().is_some_and(Link::is_wheel)
    }

    /// Whether the markers apply to the environment for any of the requested extras.
    ///
    /// Without requested extras, markers are evaluated with an empty `extra`.
    pub fn match_markers(&self, env: &MarkerEnvironment, extras_requested: &[&str]) -> bool {
        let Some(markers) = &self.markers else {
            return true;
        };
        if extras_requested.is_empty() {
            return markers.evaluate(env, "");
        }
        extras_requested
            .iter()
            .any(|extra| markers.evaluate(env, extra))
    }

    /// The known-good hashes: the `--hash` options plus a hash in the link.
    pub fn hashes(&self) -> Hashes {
        let options = self.hash_options.iter().map(|(algorithm, digests)| {
            (
                algorithm.clone(),
                digests.iter().flatten().cloned().collect::<Vec<_>>(),
            )
        });
        let link = self.link.as_ref().and_then(|link| {
            Some((
                link.hash_name()?.to_string(),
                vec![link.hash()?.to_string()],
            ))
        });
        Hashes::new(options.chain(link))
    }

    /// Check a downloaded archive against the known-good hashes.
    ///
    /// With `require_hashes`, the requirement must be pinned, must not be a VCS checkout or a
    /// directory, and must have at least one hash.
    pub fn check_archive(&self, archive: &Path, require_hashes: bool) -> Result<(), HashError> {
        let hashes = self.hashes();
        if require_hashes {
            if let Some(link) = &self.link {
                if link.is_vcs() {
                    return Err(HashError::VcsUnsupported(self.to_string()));
                }
                if link
                    .file_path()
                    .is_ok_and(|path| link.is_file() && path.is_dir())
                {
                    return Err(HashError::DirectoryUrlUnsupported(self.to_string()));
                }
            }
            if !self.is_editable && !self.is_pinned() {
                return Err(HashError::Unpinned(self.to_string()));
            }
            if hashes.is_empty() {
                return MissingHashes.check_against_path(archive);
            }
        }
        if hashes.is_empty() {
            return Ok(());
        }
        hashes.check_against_path(archive)
    }
}

impl Display for InstallRequirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.req, &self.link) {
            (Some(req), Some(link)) => write!(f, "{req} from {}", link.url())?,
            (Some(req), None) => write!(f, "{req}")?,
            (None, Some(link)) => write!(f, "{}", link.url())?,
            (None, None) => write!(f, "<InstallRequirement>")?,
        }
        write!(f, " (from {})", self.requirement_line)
    }
}

#[derive(Serialize)]
struct InstallRequirementRecord<'a> {
    name: Option<&'a str>,
    specifier: Vec<String>,
    is_editable: bool,
    is_pinned: bool,
    requirement_line: LineRecord<'a>,
    link: Option<&'a str>,
    markers: Option<String>,
    install_options: &'a [String],
    global_options: &'a [String],
    hash_options: &'a BTreeMap<String, Vec<Option<String>>>,
    is_constraint: bool,
    extras: &'a BTreeSet<String>,
}

impl Serialize for InstallRequirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Sorted by version, then operator.
        let mut specifier = self
            .specifier()
            .map(|specifiers| {
                specifiers
                    .iter()
                    .map(|specifier| {
                        let rendered = specifier.to_string();
                        let operator = specifier.operator().to_string();
                        let version = rendered[operator.len()..].to_string();
                        (version, operator, rendered)
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        specifier.sort();

        InstallRequirementRecord {
            name: self.name(),
            specifier: specifier
                .into_iter()
                .map(|(_, _, rendered)| rendered)
                .collect(),
            is_editable: self.is_editable,
            is_pinned: self.is_pinned(),
            requirement_line: LineRecord::new(&self.requirement_line, false, None),
            link: self.link.as_ref().map(Link::url),
            markers: self.markers.as_ref().map(ToString::to_string),
            install_options: &self.install_options,
            global_options: &self.global_options,
            hash_options: &self.hash_options,
            is_constraint: self.is_constraint,
            extras: &self.extras,
        }
        .serialize(serializer)
    }
}
