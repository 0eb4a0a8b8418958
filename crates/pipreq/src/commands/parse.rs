use std::path::Path;

use anyhow::Result;
use tracing::debug;

use pipreq_requirements_txt::{ParseOptions, RequirementsFile};

use crate::commands::ExitStatus;

/// Print everything found in a requirements file as JSON.
pub(crate) fn parse(
    path: &Path,
    parse_options: &ParseOptions,
    include_filename: bool,
    strict: bool,
) -> Result<ExitStatus> {
    let requirements_file = RequirementsFile::from_file_with(path, parse_options)?;
    debug!(
        "Found {} requirements, {} invalid lines and {} comments in {}",
        requirements_file.install_requirements.len(),
        requirements_file.invalid_lines.len(),
        requirements_file.comment_lines.len(),
        path.display()
    );

    let json = serde_json::to_string_pretty(&requirements_file.to_dict(include_filename))?;
    anstream::println!("{json}");

    if strict && !requirements_file.invalid_lines.is_empty() {
        return Ok(ExitStatus::Failure);
    }
    Ok(ExitStatus::Success)
}
