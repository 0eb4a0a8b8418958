//! From the bytes of a requirements file to numbered logical lines.
//!
//! Decoding honours a byte order mark or a PEP 263 `coding:` declaration. Lines ending in a
//! backslash are joined with the next one, keeping the number of the first, and each logical
//! line is split into its text and a trailing comment.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use regex::Regex;

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(^|\s+)(#.*)$").unwrap());
static ENCODING_RE: LazyLock<regex::bytes::Regex> =
    LazyLock::new(|| regex::bytes::Regex::new(r"(?-u)coding[:=]\s*([-\w.]+)").unwrap());

/// The text of a requirements file could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DecodeError {
    /// The bytes are not valid in the detected encoding.
    Invalid(&'static str),
    /// The `coding:` declaration names an encoding we don't know.
    Unknown(String),
}

/// A byte order mark and the encoding it announces.
#[derive(Debug, Clone, Copy)]
enum Bom {
    Utf8,
    Utf16Be,
    Utf16Le,
    Utf32Be,
    Utf32Le,
}

impl Bom {
    /// Longer marks first, so that UTF-32LE isn't mistaken for UTF-16LE.
    const ALL: [(&'static [u8], Self); 5] = [
        (b"\xEF\xBB\xBF", Self::Utf8),
        (b"\x00\x00\xFE\xFF", Self::Utf32Be),
        (b"\xFF\xFE\x00\x00", Self::Utf32Le),
        (b"\xFE\xFF", Self::Utf16Be),
        (b"\xFF\xFE", Self::Utf16Le),
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf16Be => "utf-16-be",
            Self::Utf16Le => "utf-16-le",
            Self::Utf32Be => "utf-32-be",
            Self::Utf32Le => "utf-32-le",
        }
    }

    fn decode(self, data: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => decode_strict(UTF_8, data),
            Self::Utf16Be => decode_strict(UTF_16BE, data),
            Self::Utf16Le => decode_strict(UTF_16LE, data),
            Self::Utf32Be => decode_utf32(data, u32::from_be_bytes),
            Self::Utf32Le => decode_utf32(data, u32::from_le_bytes),
        }
    }
}

fn decode_strict(encoding: &'static Encoding, data: &[u8]) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(data)
        .map(Cow::into_owned)
}

fn decode_utf32(data: &[u8], from_bytes: fn([u8; 4]) -> u32) -> Option<String> {
    let chunks = data.chunks_exact(4);
    if !chunks.remainder().is_empty() {
        return None;
    }
    chunks
        .map(|chunk| char::from_u32(from_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect()
}

/// Resolve a Python codec name, such as `latin-1` or `utf_8`, to an encoding.
fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    let label = label.to_ascii_lowercase().replace('_', "-");
    let label = match label.as_str() {
        "latin-1" | "l1" => "latin1",
        "utf8" | "u8" | "utf" => "utf-8",
        "cp-1252" => "cp1252",
        other => other,
    };
    Encoding::for_label(label.as_bytes())
}

/// Decode the contents of a requirements file.
///
/// A byte order mark wins, then a `coding[:=]` declaration on a comment in the first two lines,
/// then the given fallback.
pub(crate) fn auto_decode(data: &[u8], fallback: &'static Encoding) -> Result<String, DecodeError> {
    for (bom, kind) in Bom::ALL {
        if let Some(rest) = data.strip_prefix(bom) {
            return kind.decode(rest).ok_or(DecodeError::Invalid(kind.name()));
        }
    }

    for line in data.split(|byte| *byte == b'\n').take(2) {
        if !line.starts_with(b"#") {
            continue;
        }
        if let Some(captures) = ENCODING_RE.captures(line) {
            let label = String::from_utf8_lossy(&captures[1]).into_owned();
            let encoding = encoding_for_label(&label).ok_or(DecodeError::Unknown(label))?;
            return decode_strict(encoding, data).ok_or(DecodeError::Invalid(encoding.name()));
        }
    }

    decode_strict(fallback, data).ok_or(DecodeError::Invalid(fallback.name()))
}

/// The next line of `rest` on any boundary Python's `str.splitlines` knows, and the length of
/// the line with its terminator.
fn next_line(rest: &str) -> Option<(&str, usize)> {
    if rest.is_empty() {
        return None;
    }
    let Some(end) = rest.find([
        '\n', '\r', '\x0b', '\x0c', '\x1c', '\x1d', '\x1e', '\u{85}', '\u{2028}', '\u{2029}',
    ]) else {
        return Some((rest, rest.len()));
    };
    let terminator = if rest[end..].starts_with("\r\n") {
        2
    } else {
        rest[end..].chars().next().map_or(1, char::len_utf8)
    };
    Some((&rest[..end], end + terminator))
}

fn is_comment_line(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// A logical line of a requirements file, with its text and comment separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReqFileLine {
    Text { line_number: usize, line: String },
    Comment { line_number: usize, line: String },
}

/// Split a logical line into text and comment, both trimmed, dropping empty parts.
fn split_comment(line_number: usize, line: &str) -> impl Iterator<Item = ReqFileLine> {
    let (text, comment) = match COMMENT_RE.find(line) {
        Some(found) => (&line[..found.start()], &line[found.start()..]),
        None => (line, ""),
    };
    let text = text.trim();
    let comment = comment.trim();
    let text = (!text.is_empty()).then(|| ReqFileLine::Text {
        line_number,
        line: text.to_string(),
    });
    let comment = (!comment.is_empty()).then(|| ReqFileLine::Comment {
        line_number,
        line: comment.to_string(),
    });
    text.into_iter().chain(comment)
}

/// The logical lines of a decoded requirements file, split, joined and classified one at a time.
///
/// Lines ending in `\` are joined with the following lines and the joined line takes the number
/// of the first one. A comment line is never continued, and it ends a pending join.
#[derive(Debug)]
pub(crate) struct LogicalLines {
    content: String,
    offset: usize,
    line_number: usize,
    pending: Option<(usize, String)>,
    buffered: VecDeque<ReqFileLine>,
}

impl LogicalLines {
    pub(crate) fn new(content: String) -> Self {
        Self {
            content,
            offset: 0,
            line_number: 0,
            pending: None,
            buffered: VecDeque::new(),
        }
    }

    fn next_joined(&mut self) -> Option<(usize, String)> {
        while let Some((line, consumed)) = next_line(&self.content[self.offset..]) {
            self.offset += consumed;
            self.line_number += 1;
            let is_comment = is_comment_line(line);
            if !line.ends_with('\\') || is_comment {
                // Comments always start with whitespace, so they are matched when splitting.
                let line = if is_comment {
                    format!(" {line}")
                } else {
                    line.to_string()
                };
                if let Some((primary_line_number, mut joined)) = self.pending.take() {
                    joined.push_str(&line);
                    return Some((primary_line_number, joined));
                }
                return Some((self.line_number, line));
            }
            let stripped = line.trim_matches('\\');
            if let Some((_, joined)) = &mut self.pending {
                joined.push_str(stripped);
            } else {
                self.pending = Some((self.line_number, stripped.to_string()));
            }
        }
        // The last line ended with a backslash.
        self.pending.take()
    }
}

impl Iterator for LogicalLines {
    type Item = ReqFileLine;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.buffered.pop_front() {
                return Some(line);
            }
            let (line_number, line) = self.next_joined()?;
            self.buffered.extend(split_comment(line_number, &line));
        }
    }
}
