use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use encoding_rs::Encoding;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use pipreq_link::url_to_path;

use crate::error::RequirementsTxtError;
use crate::format_control::FormatControl;
use crate::options::{parse_line, LineOptions};
use crate::preprocess::{auto_decode, DecodeError, LogicalLines, ReqFileLine};
use crate::requirement::{InvalidRequirementLine, RequirementLine, RequirementOptions};

static SCHEME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(http|https|file):").unwrap());

/// Where packages are looked for, as configured by option-only lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFinder {
    pub find_links: Vec<String>,
    pub index_urls: Vec<String>,
    pub allow_all_prereleases: bool,
    /// Starts out set, so `--prefer-binary` never changes it.
    pub prefer_binary: bool,
}

impl Default for PackageFinder {
    fn default() -> Self {
        Self {
            find_links: Vec::new(),
            index_urls: Vec::new(),
            allow_all_prereleases: false,
            prefer_binary: true,
        }
    }
}

/// Options that apply to the whole parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileOptions {
    pub format_control: FormatControl,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub require_hashes: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub features_enabled: Vec<String>,
}

/// A requirement-bearing line, with the options scoped to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedRequirement {
    pub(crate) requirement_string: String,
    pub(crate) is_editable: bool,
    pub(crate) is_constraint: bool,
    pub(crate) options: RequirementOptions,
    pub(crate) requirement_line: RequirementLine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParsedItem {
    Requirement(ParsedRequirement),
    Invalid(InvalidRequirementLine),
    Comment(RequirementLine),
}

/// A requirements file being read.
struct Frame {
    filename: String,
    /// The canonical path, or the name as given if it can't be canonicalized.
    key: String,
    is_constraint: bool,
    lines: LogicalLines,
}

/// Reads requirements files, following `-r` and `-c` into nested files.
///
/// Option-only lines update the [`PackageFinder`] and [`FileOptions`] as they are read and
/// yield nothing. Files are opened when their first line is asked for, and an error opening or
/// decoding any file ends the iteration.
pub(crate) struct RequirementsFileParser<'a> {
    /// The file to open on the first call to `next`.
    root: Option<String>,
    stack: Vec<Frame>,
    include_nested: bool,
    default_encoding: &'static Encoding,
    finder: &'a mut PackageFinder,
    options: &'a mut FileOptions,
}

impl<'a> RequirementsFileParser<'a> {
    pub(crate) fn new(
        filename: &str,
        include_nested: bool,
        default_encoding: &'static Encoding,
        finder: &'a mut PackageFinder,
        options: &'a mut FileOptions,
    ) -> Self {
        Self {
            root: Some(filename.to_string()),
            stack: Vec::new(),
            include_nested,
            default_encoding,
            finder,
            options,
        }
    }

    /// Start reading a file, refusing one that is already being read.
    fn push(&mut self, filename: String, is_constraint: bool) -> Result<(), RequirementsTxtError> {
        let path = local_path(&filename)?;
        let key = fs_err::canonicalize(&path)
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|_| filename.clone());
        if self.stack.iter().any(|frame| frame.key == key) {
            return Err(RequirementsTxtError::CircularInclude {
                file: filename,
                chain: self
                    .stack
                    .iter()
                    .map(|frame| frame.filename.clone())
                    .collect(),
            });
        }

        let content = read_file(&filename, &path, self.default_encoding)?;
        self.stack.push(Frame {
            filename,
            key,
            is_constraint,
            lines: LogicalLines::new(content),
        });
        Ok(())
    }

    /// Follow a `-r` or `-c` on an option-only line.
    fn recurse(&mut self, parent: &str, options: LineOptions) -> Result<(), RequirementsTxtError> {
        let (paths, is_constraint) = if options.requirements.is_empty() {
            (options.constraints, true)
        } else {
            (options.requirements, false)
        };
        if paths.len() > 1 {
            warn!(
                "Only the first of {} nested files on one line is read: {}",
                paths.len(),
                paths.join(", ")
            );
        }
        let Some(path) = paths.into_iter().next() else {
            return Ok(());
        };
        let nested = resolve_nested(parent, &path)?;
        debug!(
            "Reading nested {} file: {nested}",
            if is_constraint { "constraints" } else { "requirements" }
        );
        self.push(nested, is_constraint)
    }

    /// Fold an option-only line into the finder and the file-wide options.
    fn handle_option_line(&mut self, options: LineOptions) {
        if options.require_hashes {
            self.options.require_hashes = true;
        }
        for feature in options.features_enabled {
            if !self.options.features_enabled.contains(&feature) {
                self.options.features_enabled.push(feature);
            }
        }

        self.finder.index_urls.extend(options.index_url);
        self.finder.index_urls.extend(options.extra_index_urls);
        self.finder.find_links.extend(options.find_links);
        if options.pre {
            self.finder.allow_all_prereleases = true;
        }
        if options.prefer_binary {
            self.finder.prefer_binary = true;
        }
    }

    fn handle_text_line(
        &mut self,
        requirement_line: RequirementLine,
        is_constraint: bool,
    ) -> Result<Option<ParsedItem>, RequirementsTxtError> {
        let (requirement_string, options) =
            match parse_line(&requirement_line.line, &mut self.options.format_control) {
                Ok(parsed) => parsed,
                Err(err) => {
                    return Ok(Some(ParsedItem::Invalid(InvalidRequirementLine {
                        requirement_line,
                        error_message: err.to_string(),
                    })));
                }
            };

        if !requirement_string.is_empty() {
            // Build options disable wheels for every package.
            if !options.install_options.is_empty() || !options.global_options.is_empty() {
                self.options.format_control.disallow_binaries();
            }
            return Ok(Some(ParsedItem::Requirement(ParsedRequirement {
                requirement_string,
                is_editable: false,
                is_constraint,
                options: RequirementOptions {
                    install_options: options.install_options,
                    global_options: options.global_options,
                    hashes: options.hashes,
                },
                requirement_line,
            })));
        }

        if let Some(editable) = options.editables.first() {
            if options.editables.len() > 1 {
                warn!(
                    "Only the first editable is used on line {} of {}",
                    requirement_line.line_number, requirement_line.filename
                );
            }
            return Ok(Some(ParsedItem::Requirement(ParsedRequirement {
                requirement_string: editable.clone(),
                is_editable: true,
                is_constraint,
                options: RequirementOptions::default(),
                requirement_line,
            })));
        }

        if self.include_nested
            && (!options.requirements.is_empty() || !options.constraints.is_empty())
        {
            self.recurse(&requirement_line.filename, options)?;
        } else {
            self.handle_option_line(options);
        }
        Ok(None)
    }
}

impl Iterator for RequirementsFileParser<'_> {
    type Item = Result<ParsedItem, RequirementsTxtError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.root.take() {
            if let Err(err) = self.push(root, false) {
                return Some(Err(err));
            }
        }
        loop {
            let frame = self.stack.last_mut()?;
            let Some(line) = frame.lines.next() else {
                self.stack.pop();
                continue;
            };
            let filename = frame.filename.clone();
            let is_constraint = frame.is_constraint;

            let result = match line {
                ReqFileLine::Comment { line_number, line } => Ok(Some(ParsedItem::Comment(
                    RequirementLine::new(line_number, line, filename),
                ))),
                ReqFileLine::Text { line_number, line } => self.handle_text_line(
                    RequirementLine::new(line_number, line, filename),
                    is_constraint,
                ),
            };
            match result {
                Ok(Some(item)) => return Some(Ok(item)),
                Ok(None) => {}
                Err(err) => {
                    self.stack.clear();
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Resolve a nested file against the file that includes it.
///
/// Under a URL, the nested path is joined as a URL. Under a path, a nested path without a scheme
/// is relative to the including file's directory.
fn resolve_nested(parent: &str, path: &str) -> Result<String, RequirementsTxtError> {
    if SCHEME_RE.is_match(parent) {
        if let Some(relative) = relative_file_url(parent) {
            if !path.starts_with('/') && !SCHEME_RE.is_match(path) && Url::parse(path).is_err() {
                return Ok(join_relative_file_url(relative, path));
            }
        }
        let to_error = |err| RequirementsTxtError::Url {
            base: parent.to_string(),
            path: path.to_string(),
            err,
        };
        let base = Url::parse(parent).map_err(to_error)?;
        return Ok(base.join(path).map_err(to_error)?.to_string());
    }
    if SCHEME_RE.is_match(path) {
        return Ok(path.to_string());
    }
    let directory = Path::new(parent).parent().unwrap_or(Path::new(""));
    Ok(directory.join(path).to_string_lossy().into_owned())
}

/// The path of a `file:` URL that is relative, like `file:reqs/base.txt`.
fn relative_file_url(url: &str) -> Option<&str> {
    let path = url
        .get(..5)
        .filter(|scheme| scheme.eq_ignore_ascii_case("file:"))
        .and(url.get(5..))?;
    (!path.starts_with('/')).then_some(path)
}

/// Join a relative path to the path of a relative `file:` URL, keeping the result relative.
fn join_relative_file_url(parent: &str, path: &str) -> String {
    let directory = parent.rfind('/').map_or("", |index| &parent[..=index]);
    let joined = format!("{directory}{path}");
    let mut segments = Vec::new();
    for segment in joined.split('/') {
        match segment {
            ".." => {
                segments.pop();
            }
            "." | "" => {}
            segment => segments.push(segment),
        }
    }
    format!("file:{}", segments.join("/"))
}

/// The local path of a requirements file given as a path or a `file:` URL.
fn local_path(filename: &str) -> Result<PathBuf, RequirementsTxtError> {
    if filename.len() >= 5 && filename[..5].eq_ignore_ascii_case("file:") {
        return url_to_path(filename).map_err(|err| RequirementsTxtError::Open {
            file: filename.to_string(),
            err: io::Error::new(io::ErrorKind::InvalidInput, err),
        });
    }
    Ok(PathBuf::from(filename))
}

fn read_file(
    filename: &str,
    path: &Path,
    default_encoding: &'static Encoding,
) -> Result<String, RequirementsTxtError> {
    let data = fs_err::read(path).map_err(|err| RequirementsTxtError::Open {
        file: filename.to_string(),
        err,
    })?;
    auto_decode(&data, default_encoding).map_err(|err| match err {
        DecodeError::Invalid(encoding) => RequirementsTxtError::Decode {
            file: filename.to_string(),
            encoding: encoding.to_string(),
        },
        DecodeError::Unknown(encoding) => RequirementsTxtError::UnknownEncoding {
            file: filename.to_string(),
            encoding,
        },
    })
}
