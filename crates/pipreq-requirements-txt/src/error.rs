use std::fmt::{Display, Formatter};
use std::io;

use thiserror::Error;

use pipreq_filename::WheelFilenameError;
use pipreq_hash::HashError;
use pipreq_pep508::Pep508Error;

use crate::shquote::UnquoteError;

/// A requirements file that can't be read at all. This aborts the whole parse, including the
/// files that include it.
#[derive(Debug, Error)]
pub enum RequirementsTxtError {
    #[error("Could not open requirements file: {file}|n{err}")]
    Open { file: String, err: io::Error },
    #[error("Could not decode requirements file {file} as {encoding}")]
    Decode { file: String, encoding: String },
    #[error("Unknown encoding `{encoding}` declared in requirements file {file}")]
    UnknownEncoding { file: String, encoding: String },
    #[error("Could not resolve `{path}` relative to {base}")]
    Url {
        base: String,
        path: String,
        #[source]
        err: url::ParseError,
    },
    #[error("{}", format_circular(.file, .chain))]
    CircularInclude { file: String, chain: Vec<String> },
}

fn format_circular(file: &str, chain: &[String]) -> String {
    format!(
        "Requirements file {file} includes itself: {} -> {file}",
        chain.join(" -> ")
    )
}

/// An option that the per-line option parser rejects.
///
/// Renders the way an `optparse` parser reports usage errors, except for shell quoting errors
/// which are reported bare.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    #[error("error: no such option: {0}")]
    NoSuchOption(String),
    #[error("error: ambiguous option: {option} ({}?)", .possibilities.join(", "))]
    Ambiguous {
        option: String,
        possibilities: Vec<String>,
    },
    #[error("error: {0} option requires 1 argument")]
    RequiresArgument(String),
    #[error("error: {0} option does not take a value")]
    TakesNoValue(String),
    #[error("error: option {option}: invalid choice: '{value}' (choose from {})", format_choices(.choices))]
    InvalidChoice {
        option: String,
        value: String,
        choices: &'static [&'static str],
    },
    #[error(transparent)]
    Quoting(#[from] UnquoteError),
}

fn format_choices(choices: &[&str]) -> String {
    choices
        .iter()
        .map(|choice| format!("'{choice}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A malformed `--no-binary`/`--only-binary` value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CommandError(pub String);

/// Why a single line did not yield a requirement.
///
/// These never abort the parse; the line is kept as an invalid line with this error's message.
#[derive(Debug, Error)]
pub enum InstallationError {
    #[error(transparent)]
    RequirementsFileParse(#[from] OptionError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    InvalidWheelFilename(#[from] WheelFilenameError),
    /// The grammar rejected the requirement, possibly with a hint at what was meant.
    #[error("{}", format_invalid_requirement(.hint))]
    InvalidRequirement {
        hint: Option<RequirementHint>,
        #[source]
        err: Pep508Error,
    },
    #[error("Extras after version '{0}'.")]
    ExtrasAfterVersion(String),
    /// A marker or extras that the grammar rejected.
    #[error(transparent)]
    Pep508(#[from] Pep508Error),
    #[error("{}", format_invalid_editable(.0))]
    InvalidEditable(String),
    #[error("Could not detect requirement name for '{0}', please specify one with #egg=your_package_name")]
    MissingEditableName(String),
    #[error("Invalid requirement: '{0}'")]
    InvalidEditableName(String),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    OpenFile(#[from] RequirementsTxtError),
}

/// What an invalid requirement probably was instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementHint {
    Path,
    SingleEquals,
}

impl Display for RequirementHint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path => f.write_str("It looks like a path."),
            Self::SingleEquals => f.write_str("= is not a valid operator. Did you mean == ?"),
        }
    }
}

fn format_invalid_requirement(hint: &Option<RequirementHint>) -> String {
    match hint {
        Some(hint) => format!("Invalid requirement\nHint: {hint}"),
        None => "Invalid requirement".to_string(),
    }
}

fn format_invalid_editable(editable: &str) -> String {
    format!(
        "{editable} is not a valid editable requirement. It should either be a path to a local \
         project or a VCS URL (beginning with {}).",
        pipreq_link::VCS_ALL_SCHEMES.join(", ")
    )
}
