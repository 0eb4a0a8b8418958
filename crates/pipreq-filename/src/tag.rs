use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Serialize;

/// A single PEP 425 compatibility tag, e.g. `py3-none-any`.
///
/// All three parts are stored lowercase, so tags compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Tag {
    interpreter: String,
    abi: String,
    platform: String,
}

impl Tag {
    pub fn new(interpreter: &str, abi: &str, platform: &str) -> Self {
        Self {
            interpreter: interpreter.to_lowercase(),
            abi: abi.to_lowercase(),
            platform: platform.to_lowercase(),
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn abi(&self) -> &str {
        &self.abi
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }
}

impl FromStr for Tag {
    type Err = String;

    /// Parse a single (non-compressed) `interpreter-abi-platform` triple.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(interpreter), Some(abi), Some(platform))
                if !interpreter.is_empty() && !abi.is_empty() && !platform.is_empty() =>
            {
                Ok(Self::new(interpreter, abi, platform))
            }
            _ => Err(format!("Not a compatibility tag: `{s}`")),
        }
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.interpreter, self.abi, self.platform)
    }
}
