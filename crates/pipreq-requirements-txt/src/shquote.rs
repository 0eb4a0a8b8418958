//! POSIX shell style splitting of the options part of a line, with the rules of Python's
//! `shlex.split`.
//!
//! Outside of quotes a backslash escapes any character. Single quotes allow no escapes at all.
//! Inside double quotes, only `"` and `\` can be escaped; any other backslash is kept.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnquoteError {
    #[error("No closing quotation")]
    NoClosingQuotation,
    #[error("No escaped character")]
    NoEscapedCharacter,
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn unquote_open_single(acc: &mut String, cursor: &mut std::str::Chars) -> Result<(), UnquoteError> {
    for c in cursor.by_ref() {
        if c == '\'' {
            return Ok(());
        }
        acc.push(c);
    }
    Err(UnquoteError::NoClosingQuotation)
}

fn unquote_open_double(acc: &mut String, cursor: &mut std::str::Chars) -> Result<(), UnquoteError> {
    loop {
        match cursor.next() {
            Some('"') => return Ok(()),
            Some('\\') => match cursor.next() {
                Some(esc_ch @ ('"' | '\\')) => acc.push(esc_ch),
                Some(esc_ch) => {
                    acc.push('\\');
                    acc.push(esc_ch);
                }
                None => return Err(UnquoteError::NoEscapedCharacter),
            },
            Some(inner_ch) => acc.push(inner_ch),
            None => return Err(UnquoteError::NoClosingQuotation),
        }
    }
}

/// Split a string into words.
///
/// Quotes may be adjacent to other characters of the same word, and an empty pair of quotes is
/// an empty word.
pub(crate) fn split(source: &str) -> Result<Vec<String>, UnquoteError> {
    // Without quotes or escapes, splitting on whitespace is all there is to do.
    if memchr::memchr3(b'\'', b'"', b'\\', source.as_bytes()).is_none() {
        return Ok(source
            .split(is_whitespace)
            .filter(|word| !word.is_empty())
            .map(ToString::to_string)
            .collect());
    }

    let mut words = Vec::new();
    let mut acc = String::new();
    // Whether the current word has started, which an empty quote pair also does.
    let mut in_word = false;
    let mut cursor = source.chars();
    while let Some(next_ch) = cursor.next() {
        match next_ch {
            '\'' => {
                unquote_open_single(&mut acc, &mut cursor)?;
                in_word = true;
            }
            '"' => {
                unquote_open_double(&mut acc, &mut cursor)?;
                in_word = true;
            }
            '\\' => {
                let esc_ch = cursor.next().ok_or(UnquoteError::NoEscapedCharacter)?;
                acc.push(esc_ch);
                in_word = true;
            }
            c if is_whitespace(c) => {
                if in_word {
                    words.push(std::mem::take(&mut acc));
                    in_word = false;
                }
            }
            c => {
                acc.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(acc);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("--hash=sha256:abc  --pre", &["--hash=sha256:abc", "--pre"])]
    #[test_case("", &[])]
    #[test_case("--install-option='--prefix=/usr/local'", &["--install-option=--prefix=/usr/local"])]
    #[test_case(r#"--global-option "a b" c"#, &["--global-option", "a b", "c"])]
    #[test_case(r#"-i "a\"b\x""#, &["-i", r#"a"b\x"#])]
    #[test_case(r"foo\ bar '' x", &["foo bar", "", "x"])]
    fn words(source: &str, expected: &[&str]) {
        assert_eq!(split(source).unwrap(), expected);
    }

    #[test_case("--install-option='unterminated", UnquoteError::NoClosingQuotation)]
    #[test_case(r#"--global-option "unterminated"#, UnquoteError::NoClosingQuotation)]
    #[test_case(r"--pre \", UnquoteError::NoEscapedCharacter)]
    fn errors(source: &str, expected: UnquoteError) {
        assert_eq!(split(source).unwrap_err(), expected);
    }
}
