//! Parses requirements files the way pip does.
//!
//! A [`RequirementsFile`] holds everything found in a file: the requirements, the lines that
//! could not be parsed, the comments, and the index and binary format options.
//!
//! ```text
//! # A comment
//! requests[security]>=2.8.1 ; python_version < "3.8"  # end of line comment
//! -e git+https://github.com/pypa/pip.git#egg=pip
//! ./downloads/numpy-1.26.4-cp312-cp312-manylinux_2_17_x86_64.whl
//! --hash=sha256:abcd
//! -r other-requirements.txt
//! -c constraints.txt
//! --no-binary :all:
//! ```
//!
//! Lines are first joined at trailing backslashes and split from their comments. The requirement
//! part of each line is kept away from the options, which are split like a shell would and then
//! decoded the way pip's `optparse` parser does. Nested `-r` and `-c` files are only read when
//! asked for.

use std::path::Path;

use encoding_rs::Encoding;
use serde_json::json;

pub use crate::error::{
    CommandError, InstallationError, OptionError, RequirementHint, RequirementsTxtError,
};
pub use crate::format_control::{Format, FormatControl, ALL, NONE};
pub use crate::options::FEATURE_CHOICES;
pub use crate::parser::{FileOptions, PackageFinder};
pub use crate::requirement::{
    parse_req_from_editable, parse_req_from_line, InstallRequirement, InvalidRequirementLine,
    RequirementLine, RequirementOptions, RequirementParts,
};
pub use crate::shquote::UnquoteError;

use crate::parser::{ParsedItem, ParsedRequirement, RequirementsFileParser};

mod error;
mod format_control;
mod options;
mod parser;
mod preprocess;
mod requirement;
mod shquote;

/// How to read a requirements file.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Follow `-r` and `-c` into nested files.
    pub include_nested: bool,
    /// Used when a file has neither a byte order mark nor a `coding:` declaration.
    pub default_encoding: &'static Encoding,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            include_nested: false,
            default_encoding: encoding_rs::UTF_8,
        }
    }
}

/// Everything found in a requirements file, and in its nested files if they were followed.
#[derive(Debug, Clone)]
pub struct RequirementsFile {
    pub filename: String,
    pub install_requirements: Vec<InstallRequirement>,
    pub invalid_lines: Vec<InvalidRequirementLine>,
    pub comment_lines: Vec<RequirementLine>,
    pub options: FileOptions,
    pub finder: PackageFinder,
}

impl RequirementsFile {
    /// Parse a requirements file, following nested `-r` and `-c` files if `include_nested`.
    pub fn from_file(
        filename: impl AsRef<Path>,
        include_nested: bool,
    ) -> Result<Self, RequirementsTxtError> {
        Self::from_file_with(
            filename,
            &ParseOptions {
                include_nested,
                ..ParseOptions::default()
            },
        )
    }

    /// Parse a requirements file.
    ///
    /// A line that can't be parsed becomes an invalid line. A file that can't be read or
    /// decoded, including a nested one, fails the whole parse.
    pub fn from_file_with(
        filename: impl AsRef<Path>,
        parse_options: &ParseOptions,
    ) -> Result<Self, RequirementsTxtError> {
        let filename = filename.as_ref().to_string_lossy().into_owned();
        let mut finder = PackageFinder::default();
        let mut options = FileOptions::default();
        let mut install_requirements = Vec::new();
        let mut invalid_lines = Vec::new();
        let mut comment_lines = Vec::new();

        let parser = RequirementsFileParser::new(
            &filename,
            parse_options.include_nested,
            parse_options.default_encoding,
            &mut finder,
            &mut options,
        );
        for item in parser {
            match item? {
                ParsedItem::Requirement(parsed) => {
                    let requirement_line = parsed.requirement_line.clone();
                    match install_req_from_parsed_requirement(parsed) {
                        Ok(requirement) => install_requirements.push(requirement),
                        Err(err) => invalid_lines.push(InvalidRequirementLine {
                            requirement_line,
                            error_message: err.to_string(),
                        }),
                    }
                }
                ParsedItem::Invalid(invalid) => invalid_lines.push(invalid),
                ParsedItem::Comment(comment) => comment_lines.push(comment),
            }
        }

        Ok(Self {
            filename,
            install_requirements,
            invalid_lines,
            comment_lines,
            options,
            finder,
        })
    }

    pub fn find_links(&self) -> &[String] {
        &self.finder.find_links
    }

    pub fn index_urls(&self) -> &[String] {
        &self.finder.index_urls
    }

    /// A snapshot of the parse as plain JSON values.
    pub fn to_dict(&self, include_filename: bool) -> serde_json::Value {
        json!({
            "find_links": self.finder.find_links,
            "index_urls": self.finder.index_urls,
            "options": self.options,
            "install_requirements": self.install_requirements,
            "invalid_lines": self
                .invalid_lines
                .iter()
                .map(|line| line.to_dict(include_filename))
                .collect::<Vec<_>>(),
            "comment_lines": self
                .comment_lines
                .iter()
                .map(|line| line.to_dict(include_filename))
                .collect::<Vec<_>>(),
        })
    }

    /// Reassemble the requirements file from its normalized lines.
    ///
    /// Lines are ordered by line number, and an end of line comment is put back after the text
    /// of its line.
    pub fn dumps(&self) -> String {
        let mut lines: Vec<(&RequirementLine, bool)> = self
            .install_requirements
            .iter()
            .map(|requirement| &requirement.requirement_line)
            .chain(self.invalid_lines.iter().map(|line| &line.requirement_line))
            .map(|line| (line, false))
            .chain(self.comment_lines.iter().map(|line| (line, true)))
            .collect();
        lines.sort_by_key(|(line, is_comment)| (line.line_number, *is_comment));

        let mut dumped: Vec<String> = Vec::with_capacity(lines.len());
        let mut previous_line_number = 0;
        for (line, is_comment) in lines {
            match dumped.last_mut() {
                Some(previous) if is_comment && previous_line_number == line.line_number => {
                    previous.push(' ');
                    previous.push_str(&line.line);
                }
                _ => dumped.push(line.line.clone()),
            }
            previous_line_number = line.line_number;
        }

        let mut output = dumped.join("\n");
        if !output.is_empty() {
            output.push('\n');
        }
        output
    }
}

fn install_req_from_parsed_requirement(
    parsed: ParsedRequirement,
) -> Result<InstallRequirement, InstallationError> {
    if parsed.is_editable {
        InstallRequirement::from_editable(
            &parsed.requirement_string,
            parsed.requirement_line,
            parsed.is_constraint,
        )
    } else {
        InstallRequirement::from_line(
            &parsed.requirement_string,
            parsed.options,
            parsed.is_constraint,
            parsed.requirement_line,
        )
    }
}
