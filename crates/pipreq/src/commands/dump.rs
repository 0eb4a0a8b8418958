use std::path::Path;

use anyhow::Result;

use pipreq_requirements_txt::{ParseOptions, RequirementsFile};

use crate::commands::ExitStatus;

/// Print the normalized text of a requirements file.
pub(crate) fn dump(path: &Path, parse_options: &ParseOptions) -> Result<ExitStatus> {
    let requirements_file = RequirementsFile::from_file_with(path, parse_options)?;
    anstream::print!("{}", requirements_file.dumps());
    Ok(ExitStatus::Success)
}
