//! A library for python [dependency specifiers](https://packaging.python.org/en/latest/specifications/dependency-specifiers/)
//! better known as [PEP 508](https://peps.python.org/pep-0508/)
//!
//! Names and extras are kept as written; use [`Requirement::canonical_name`] to compare them.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;
use unicode_width::UnicodeWidthChar;

pub use marker::{
    MarkerEnvironment, MarkerExpression, MarkerOperator, MarkerTree, MarkerValue,
    MarkerValueString, MarkerValueVersion,
};
use pipreq_normalize::canonicalize_name;
use pipreq_pep440::{VersionSpecifier, VersionSpecifiers};

use crate::cursor::Cursor;

mod cursor;
mod marker;

/// Error with a span attached. `start` and `len` are byte offsets into `input`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Pep508Error {
    /// The error from our parser
    pub message: Pep508ErrorSource,
    /// Span start index
    pub start: usize,
    /// Span length
    pub len: usize,
    /// The input string so we can print it underlined
    pub input: String,
}

/// The kind of [`Pep508Error`].
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum Pep508ErrorSource {
    /// An error from our parser.
    #[error("{0}")]
    String(String),
    /// A version specifier clause that PEP 440 rejects.
    #[error("{0}")]
    InvalidSpecifier(String),
    /// The requirement is syntactically close to valid, but not supported.
    #[error("{0}")]
    UnsupportedRequirement(String),
}

impl Display for Pep508Error {
    /// Pretty formatting with underline.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let start = self.start.min(self.input.len());
        let start_offset = self.input[..start]
            .chars()
            .filter_map(UnicodeWidthChar::width)
            .sum::<usize>();
        let underline_len = if start == self.input.len() {
            1
        } else {
            let end = (start + self.len).min(self.input.len());
            self.input[start..end]
                .chars()
                .filter_map(UnicodeWidthChar::width)
                .sum::<usize>()
                .max(1)
        };
        write!(
            f,
            "{}\n{}\n{}{}",
            self.message,
            self.input,
            " ".repeat(start_offset),
            "^".repeat(underline_len)
        )
    }
}

impl std::error::Error for Pep508Error {}

/// A PEP 508 dependency specification
#[derive(Hash, Debug, Clone, Eq, PartialEq)]
pub struct Requirement {
    /// The distribution name as written, such as `Requests` in
    /// `Requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`
    pub name: String,
    /// The list of extras as written, such as `security`, `tests` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`
    pub extras: Vec<String>,
    /// The version specifier such as `>= 2.8.1`, `== 2.8.*` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`
    /// or a url
    pub version_or_url: Option<VersionOrUrl>,
    /// The markers such as `python_version > "3.8"` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`.
    pub marker: Option<MarkerTree>,
}

impl Requirement {
    /// The normalized distribution name.
    pub fn canonical_name(&self) -> String {
        canonicalize_name(&self.name)
    }

    /// The version specifiers, if this is not a URL requirement.
    pub fn specifier(&self) -> Option<&VersionSpecifiers> {
        match &self.version_or_url {
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => Some(specifiers),
            _ => None,
        }
    }

    /// The URL following `@`, if any.
    pub fn url(&self) -> Option<&str> {
        match &self.version_or_url {
            Some(VersionOrUrl::Url(url)) => Some(url),
            _ => None,
        }
    }

    /// Returns whether the markers apply for the given environment, with `extra` set to the
    /// given value.
    pub fn evaluate_markers(&self, env: &MarkerEnvironment, extra: &str) -> bool {
        self.marker
            .as_ref()
            .is_none_or(|marker| marker.evaluate(env, extra))
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let mut extras = self.extras.clone();
            extras.sort();
            write!(f, "[{}]", extras.join(","))?;
        }
        match &self.version_or_url {
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => {
                let mut specifiers: Vec<String> =
                    specifiers.iter().map(ToString::to_string).collect();
                specifiers.sort();
                write!(f, "{}", specifiers.join(","))?;
            }
            Some(VersionOrUrl::Url(url)) => {
                // A URL must be separated from the marker by whitespace
                write!(f, " @ {url}")?;
                if self.marker.is_some() {
                    write!(f, " ")?;
                }
            }
            None => {}
        }
        if let Some(marker) = &self.marker {
            write!(f, "; {marker}")?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for Requirement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl FromStr for Requirement {
    type Err = Pep508Error;

    /// Parse a [dependency specifier](https://packaging.python.org/en/latest/specifications/dependency-specifiers)
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse(&mut Cursor::new(input))
    }
}

/// The actual version specifier or url to install
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub enum VersionOrUrl {
    /// A PEP 440 version specifier set
    VersionSpecifier(VersionSpecifiers),
    /// A direct reference, kept exactly as written
    Url(String),
}

fn parse_name(cursor: &mut Cursor) -> Result<String, Pep508Error> {
    // https://peps.python.org/pep-0508/#names
    // ^([A-Z0-9]|[A-Z0-9][A-Z0-9._-]*[A-Z0-9])$ with re.IGNORECASE
    let start = cursor.pos();
    match cursor.next() {
        Some((_, 'A'..='Z' | 'a'..='z' | '0'..='9')) => {}
        Some((index, char)) => {
            return Err(Pep508Error {
                message: Pep508ErrorSource::String(format!(
                    "Expected package name starting with an alphanumeric character, found '{char}'"
                )),
                start: index,
                len: char.len_utf8(),
                input: cursor.to_string(),
            });
        }
        None => {
            return Err(Pep508Error {
                message: Pep508ErrorSource::String(
                    "Empty field is not allowed for PEP508".to_string(),
                ),
                start: 0,
                len: 1,
                input: cursor.to_string(),
            });
        }
    }

    cursor.take_while(|char| matches!(char, 'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '-' | '_'));
    let name = cursor.slice(start, cursor.pos() - start);
    // [.-_] can't be the final character
    if let Some(last @ ('.' | '-' | '_')) = name.chars().last() {
        return Err(Pep508Error {
            message: Pep508ErrorSource::String(format!(
                "Package name must end with an alphanumeric character, not '{last}'"
            )),
            start: cursor.pos() - 1,
            len: 1,
            input: cursor.to_string(),
        });
    }
    Ok(name.to_string())
}

/// parses extras in the `[extra1,extra2] format`
fn parse_extras(cursor: &mut Cursor) -> Result<Vec<String>, Pep508Error> {
    let Some(bracket_pos) = cursor.eat_char('[') else {
        return Ok(vec![]);
    };
    let mut extras = Vec::new();

    // `[]` is allowed
    cursor.eat_whitespace();
    if cursor.eat_char(']').is_some() {
        return Ok(extras);
    }

    loop {
        // wsp* before the identifier
        cursor.eat_whitespace();
        let early_eof_error = Pep508Error {
            message: Pep508ErrorSource::String(
                "Missing closing bracket (expected ']', found end of dependency specification)"
                    .to_string(),
            ),
            start: bracket_pos,
            len: 1,
            input: cursor.to_string(),
        };

        // First char of the identifier
        let start = match cursor.next() {
            Some((pos, 'a'..='z' | 'A'..='Z' | '0'..='9')) => pos,
            Some((pos, other)) => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(format!(
                        "Expected an alphanumeric character starting the extra name, found '{other}'"
                    )),
                    start: pos,
                    len: other.len_utf8(),
                    input: cursor.to_string(),
                });
            }
            None => return Err(early_eof_error),
        };
        // identifier_end = letterOrDigit | (('-' | '_' | '.' )* letterOrDigit)
        cursor
            .take_while(|char| matches!(char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.'));
        let extra = cursor.slice(start, cursor.pos() - start).to_string();
        match cursor.peek() {
            Some((pos, char)) if char != ',' && char != ']' && !char.is_whitespace() => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(format!(
                        "Invalid character in extras name, expected an alphanumeric character, '-', '_', '.', ',' or ']', found '{char}'"
                    )),
                    start: pos,
                    len: char.len_utf8(),
                    input: cursor.to_string(),
                });
            }
            _ => {}
        }
        // wsp* after the identifier
        cursor.eat_whitespace();
        // end or next identifier?
        match cursor.next() {
            Some((_, ',')) => extras.push(extra),
            Some((_, ']')) => {
                extras.push(extra);
                break;
            }
            Some((pos, other)) => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(format!(
                        "Expected either ',' (separating extras) or ']' (ending the extras section), found '{other}'"
                    )),
                    start: pos,
                    len: other.len_utf8(),
                    input: cursor.to_string(),
                });
            }
            None => return Err(early_eof_error),
        }
    }

    Ok(extras)
}

/// Parse the URL of a direct reference, which runs until the next whitespace.
fn parse_url(cursor: &mut Cursor) -> Result<String, Pep508Error> {
    // wsp*
    cursor.eat_whitespace();
    // <URI_reference>
    let (start, len) = cursor.take_while(|char| !char.is_whitespace());
    let url = cursor.slice(start, len);
    if url.is_empty() {
        return Err(Pep508Error {
            message: Pep508ErrorSource::String("Expected URL".to_string()),
            start,
            len,
            input: cursor.to_string(),
        });
    }
    if !url.contains(':') {
        return Err(Pep508Error {
            message: Pep508ErrorSource::String(format!("Expected a URL with a scheme, found '{url}'")),
            start,
            len,
            input: cursor.to_string(),
        });
    }
    Ok(url.to_string())
}

/// PEP 440 wrapper
fn parse_specifier(
    cursor: &Cursor,
    buffer: &str,
    start: usize,
    end: usize,
) -> Result<VersionSpecifier, Pep508Error> {
    VersionSpecifier::from_str(buffer).map_err(|err| Pep508Error {
        message: Pep508ErrorSource::InvalidSpecifier(err.to_string()),
        start,
        len: end - start,
        input: cursor.to_string(),
    })
}

/// Such as `>=1.19,<2.0`, either delimited by the end of the specifier or a `;` for the marker part
///
/// ```text
/// version_one (wsp* ',' version_one)*
/// ```
fn parse_version_specifier(cursor: &mut Cursor) -> Result<Option<VersionOrUrl>, Pep508Error> {
    let mut start = cursor.pos();
    let mut specifiers = Vec::new();
    let mut buffer = String::new();
    let requirement_kind = loop {
        match cursor.peek() {
            Some((end, ',')) => {
                let specifier = parse_specifier(cursor, &buffer, start, end)?;
                specifiers.push(specifier);
                buffer.clear();
                cursor.next();
                start = end + 1;
            }
            Some((_, ';')) | None => {
                let end = cursor.pos();
                let specifier = parse_specifier(cursor, &buffer, start, end)?;
                specifiers.push(specifier);
                break Some(VersionOrUrl::VersionSpecifier(
                    specifiers.into_iter().collect(),
                ));
            }
            Some((_, char)) => {
                buffer.push(char);
                cursor.next();
            }
        }
    };
    Ok(requirement_kind)
}

/// Such as `(>=1.19,<2.0)`
///
/// ```text
/// '(' version_one (wsp* ',' version_one)* ')'
/// ```
fn parse_version_specifier_parentheses(
    cursor: &mut Cursor,
) -> Result<Option<VersionOrUrl>, Pep508Error> {
    let brace_pos = cursor.pos();
    cursor.next();
    // Makes for slightly better error underline
    cursor.eat_whitespace();
    let mut start = cursor.pos();
    let mut specifiers = Vec::new();
    let mut buffer = String::new();
    let requirement_kind = loop {
        match cursor.next() {
            Some((end, ',')) => {
                let specifier = parse_specifier(cursor, &buffer, start, end)?;
                specifiers.push(specifier);
                buffer.clear();
                start = end + 1;
            }
            Some((end, ')')) => {
                let specifier = parse_specifier(cursor, &buffer, start, end)?;
                specifiers.push(specifier);
                break Some(VersionOrUrl::VersionSpecifier(
                    specifiers.into_iter().collect(),
                ));
            }
            Some((_, char)) => buffer.push(char),
            None => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(
                        "Missing closing parenthesis (expected ')', found end of dependency specification)"
                            .to_string(),
                    ),
                    start: brace_pos,
                    len: 1,
                    input: cursor.to_string(),
                });
            }
        }
    };
    Ok(requirement_kind)
}

/// Parse a [dependency specifier](https://packaging.python.org/en/latest/specifications/dependency-specifiers)
fn parse(cursor: &mut Cursor) -> Result<Requirement, Pep508Error> {
    // The grammar is:
    // ```text
    // name_req      = name wsp* extras? wsp* versionspec? wsp* quoted_marker?
    // url_req       = name wsp* extras? wsp* urlspec wsp+ quoted_marker?
    // specification = wsp* ( url_req | name_req ) wsp*
    // ```
    // Which we merge into:
    // ```text
    // specification = wsp* name wsp* extras? wsp* (('@' wsp* url_req) | ('(' versionspec ')') | (versionspec)) wsp* (';' wsp* marker)? wsp*
    // ```
    cursor.eat_whitespace();
    let start = cursor.pos();
    let name = parse_name(cursor)?;
    cursor.eat_whitespace();
    let extras = parse_extras(cursor)?;
    cursor.eat_whitespace();

    // ( url_req | name_req )?
    let requirement_kind = match cursor.peek_char() {
        Some('@') => {
            cursor.next();
            // url_req requires whitespace before the marker, so the URL runs to the next space
            Some(VersionOrUrl::Url(parse_url(cursor)?))
        }
        Some('(') => parse_version_specifier_parentheses(cursor)?,
        Some('<' | '=' | '>' | '~' | '!') => parse_version_specifier(cursor)?,
        Some(';') | None => None,
        Some(other) => {
            // A URL without a package name parses as a name followed by `:`.
            let rest = cursor.clone().at(start).rest();
            let token = rest.split(char::is_whitespace).next().unwrap_or_default();
            return if token.contains("://") {
                Err(Pep508Error {
                    message: Pep508ErrorSource::UnsupportedRequirement(
                        "URL requirement must be preceded by a package name. Add the name of the package before the URL (e.g., `package_name @ https://...`)."
                            .to_string(),
                    ),
                    start,
                    len: token.len(),
                    input: cursor.to_string(),
                })
            } else {
                Err(Pep508Error {
                    message: Pep508ErrorSource::String(format!(
                        "Expected one of `@`, `(`, `<`, `=`, `>`, `~`, `!`, `;`, found `{other}`"
                    )),
                    start: cursor.pos(),
                    len: other.len_utf8(),
                    input: cursor.to_string(),
                })
            };
        }
    };

    cursor.eat_whitespace();
    // quoted_marker?
    let marker = if cursor.eat_char(';').is_some() {
        Some(marker::parse_markers_impl(cursor)?)
    } else {
        None
    };
    cursor.eat_whitespace();
    if let Some((pos, char)) = cursor.next() {
        return Err(Pep508Error {
            message: Pep508ErrorSource::String(if marker.is_none() {
                format!(r#"Expected end of input or ';', found '{char}'"#)
            } else {
                format!(r#"Expected end of input, found '{char}'"#)
            }),
            start: pos,
            len: char.len_utf8(),
            input: cursor.to_string(),
        });
    }

    Ok(Requirement {
        name,
        extras,
        version_or_url: requirement_kind,
        marker,
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indoc::indoc;
    use test_case::test_case;

    use pipreq_pep440::{Operator, Version, VersionSpecifier};

    use crate::{MarkerEnvironment, Pep508ErrorSource, Requirement, VersionOrUrl};

    fn assert_err(input: &str, error: &str) {
        assert_eq!(Requirement::from_str(input).unwrap_err().to_string(), error);
    }

    #[test]
    fn basic() {
        let requirement = Requirement::from_str(
            r#"Requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8""#,
        )
        .unwrap();
        assert_eq!(requirement.name, "Requests");
        assert_eq!(requirement.canonical_name(), "requests");
        assert_eq!(requirement.extras, vec!["security", "tests"]);
        let specifiers = requirement.specifier().unwrap();
        assert_eq!(
            specifiers[0],
            VersionSpecifier::new(
                Operator::GreaterThanEqual,
                Version::from_str("2.8.1").unwrap(),
                false
            )
            .unwrap()
        );
        assert_eq!(specifiers.len(), 2);
        assert_eq!(
            requirement.marker.unwrap().to_string(),
            r#"python_version > "3.8""#
        );
    }

    #[test_case("numpy", "numpy")]
    #[test_case("numpy>=1.19", "numpy>=1.19")]
    #[test_case("numpy >= 1.19, <2.0", "numpy<2.0,>=1.19")]
    #[test_case("numpy (>=1.19)", "numpy>=1.19")]
    #[test_case("black[jupyter,d]", "black[d,jupyter]")]
    #[test_case("pip @ https://example.com/pip-1.0.tar.gz", "pip @ https://example.com/pip-1.0.tar.gz")]
    #[test_case(
        "pip @ https://example.com/pip.zip ; os_name=='nt'",
        r#"pip @ https://example.com/pip.zip ; os_name == "nt""#
    )]
    #[test_case("foo; python_version<'3.8'", r#"foo; python_version < "3.8""#)]
    fn display(input: &str, expected: &str) {
        assert_eq!(Requirement::from_str(input).unwrap().to_string(), expected);
    }

    #[test]
    fn url() {
        let requirement =
            Requirement::from_str("pip @ git+https://github.com/pypa/pip.git@1.3.1").unwrap();
        assert_eq!(
            requirement.version_or_url,
            Some(VersionOrUrl::Url(
                "git+https://github.com/pypa/pip.git@1.3.1".to_string()
            ))
        );
        assert_eq!(requirement.specifier(), None);
    }

    #[test]
    fn empty_extras() {
        let requirement = Requirement::from_str("black[]").unwrap();
        assert!(requirement.extras.is_empty());
    }

    #[test]
    fn evaluate_markers() {
        let env = MarkerEnvironment {
            python_version: "3.7".to_string(),
            ..MarkerEnvironment::default()
        };
        let requirement = Requirement::from_str("foo; python_version < '3.8'").unwrap();
        assert!(requirement.evaluate_markers(&env, ""));
        let requirement = Requirement::from_str("foo").unwrap();
        assert!(requirement.evaluate_markers(&env, ""));
    }

    #[test]
    fn error_empty() {
        assert_err(
            "",
            indoc! {"
                Empty field is not allowed for PEP508

                ^"
            },
        );
    }

    #[test]
    fn error_start() {
        assert_err(
            "_name",
            indoc! {"
                Expected package name starting with an alphanumeric character, found '_'
                _name
                ^"
            },
        );
    }

    #[test]
    fn error_end() {
        assert_err(
            "name_",
            indoc! {"
                Package name must end with an alphanumeric character, not '_'
                name_
                    ^"
            },
        );
    }

    #[test]
    fn error_extras_eof() {
        assert_err(
            "black[d",
            indoc! {"
                Missing closing bracket (expected ']', found end of dependency specification)
                black[d
                     ^"
            },
        );
    }

    #[test]
    fn error_extra_with_invalid_char() {
        assert_err(
            "name[bar+]",
            indoc! {"
                Invalid character in extras name, expected an alphanumeric character, '-', '_', '.', ',' or ']', found '+'
                name[bar+]
                        ^"
            },
        );
    }

    #[test]
    fn error_no_operator() {
        assert_err(
            "numpy 1.0",
            indoc! {"
                Expected one of `@`, `(`, `<`, `=`, `>`, `~`, `!`, `;`, found `1`
                numpy 1.0
                      ^"
            },
        );
    }

    #[test]
    fn error_single_equals() {
        let err = Requirement::from_str("numpy=1.0").unwrap_err();
        assert!(matches!(err.message, Pep508ErrorSource::InvalidSpecifier(_)));
    }

    #[test]
    fn error_parenthesized() {
        assert_err(
            "numpy ( >=1.19",
            indoc! {"
                Missing closing parenthesis (expected ')', found end of dependency specification)
                numpy ( >=1.19
                      ^"
            },
        );
    }

    #[test]
    fn error_marker_unexpected() {
        assert_err(
            "numpy; python_version >= '3.8' blah",
            indoc! {"
                Unexpected character 'b', expected 'and', 'or' or end of input
                numpy; python_version >= '3.8' blah
                                               ^^^^"
            },
        );
    }

    #[test]
    fn error_trailing() {
        assert_err(
            "numpy[d] x",
            indoc! {"
                Expected one of `@`, `(`, `<`, `=`, `>`, `~`, `!`, `;`, found `x`
                numpy[d] x
                         ^"
            },
        );
    }

    #[test]
    fn error_url_without_name() {
        let err = Requirement::from_str("https://example.com/pip-1.0.tar.gz").unwrap_err();
        assert!(matches!(
            err.message,
            Pep508ErrorSource::UnsupportedRequirement(_)
        ));
    }

    #[test]
    fn url_swallows_unspaced_marker() {
        let requirement =
            Requirement::from_str("pip @ https://example.com/pip.zip;os_name=='nt'").unwrap();
        assert_eq!(
            requirement.url(),
            Some("https://example.com/pip.zip;os_name=='nt'")
        );
        assert_eq!(requirement.marker, None);
    }

    #[test]
    fn serde_roundtrip() {
        let requirement: Requirement = serde_json::from_str(r#""numpy>=1.19""#).unwrap();
        assert_eq!(
            serde_json::to_string(&requirement).unwrap(),
            r#""numpy>=1.19""#
        );
    }
}
