//! Python version numbers and specifiers, implementing [PEP 440](https://peps.python.org/pep-0440).
//!
//! ```text
//! let version = Version::from_str("1.19")?;
//! let specifiers = VersionSpecifiers::from_str(">=1.16, <2.0")?;
//! assert!(specifiers.contains(&version));
//! ```
//!
//! Ordering and matching disagree in a few places: `1.0+local` sorts after `1.0`, but `==1.0`
//! matches `1.0+local`. Sorting is a total order, matching handles pre-release, post-release and
//! local segments with the special cases PEP 440 prescribes.

pub use version::{
    LocalSegment, Operator, OperatorParseError, PreRelease, Version, VersionParseError,
};
pub use version_specifier::{
    VersionSpecifier, VersionSpecifierParseError, VersionSpecifiers, VersionSpecifiersParseError,
};

mod version;
mod version_specifier;
