use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use thiserror::Error;

use crate::Tag;

static WHEEL_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<namever>(?P<name>.+?)-(?P<ver>.*?))((-(?P<build>\d[^-]*?))?-(?P<pyver>.+?)-(?P<abi>.+?)-(?P<plat>.+?)\.whl|\.dist-info)$",
    )
    .unwrap()
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WheelFilenameError {
    #[error("{0} is not a valid wheel filename.")]
    InvalidWheelFilename(String),
    #[error("{0} is not a supported wheel on this platform.")]
    Unsupported(String),
}

/// The parts of a wheel's filename.
///
/// Underscores in the name and version are read as dashes. The name isn't normalized any further,
/// and the version is kept as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WheelFilename {
    pub filename: String,
    pub name: String,
    pub version: String,
    pub build_tag: Option<String>,
    pub pyversions: Vec<String>,
    pub abis: Vec<String>,
    pub plats: Vec<String>,
    /// Every tag combination the compressed tag sets expand to.
    pub file_tags: BTreeSet<Tag>,
}

impl FromStr for WheelFilename {
    type Err = WheelFilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let captures = WHEEL_FILE_RE
            .captures(filename)
            .ok_or_else(|| WheelFilenameError::InvalidWheelFilename(filename.to_string()))?;
        let group = |name: &str| captures.name(name).map_or("", |m| m.as_str());

        // A `.dist-info` name carries no tags.
        let tags = |name: &str| -> Vec<String> {
            captures
                .name(name)
                .map(|m| m.as_str().split('.').map(String::from).collect())
                .unwrap_or_default()
        };
        let pyversions = tags("pyver");
        let abis = tags("abi");
        let plats = tags("plat");

        let mut file_tags = BTreeSet::new();
        for pyversion in &pyversions {
            for abi in &abis {
                for plat in &plats {
                    file_tags.insert(Tag::new(pyversion, abi, plat));
                }
            }
        }

        Ok(Self {
            filename: filename.to_string(),
            name: group("name").replace('_', "-"),
            version: group("ver").replace('_', "-"),
            build_tag: captures.name("build").map(|m| m.as_str().to_string()),
            pyversions,
            abis,
            plats,
            file_tags,
        })
    }
}

impl Display for WheelFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.filename)
    }
}

impl WheelFilename {
    /// The wheel's tags, rendered and sorted.
    pub fn get_formatted_file_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.file_tags.iter().map(ToString::to_string).collect();
        tags.sort();
        tags
    }

    /// The lowest index any of the wheel's tags has in `tags`, which lists the supported tags
    /// most preferred first.
    pub fn support_index_min(&self, tags: &[Tag]) -> Result<usize, WheelFilenameError> {
        tags.iter()
            .position(|tag| self.file_tags.contains(tag))
            .ok_or_else(|| WheelFilenameError::Unsupported(self.filename.clone()))
    }

    /// The best (lowest) priority any of the wheel's tags has in `tag_to_priority`.
    ///
    /// Avoids the linear scan of [`WheelFilename::support_index_min`] for long tag lists.
    pub fn find_most_preferred_tag(
        &self,
        tag_to_priority: &FxHashMap<Tag, usize>,
    ) -> Result<usize, WheelFilenameError> {
        self.file_tags
            .iter()
            .filter_map(|tag| tag_to_priority.get(tag).copied())
            .min()
            .ok_or_else(|| WheelFilenameError::Unsupported(self.filename.clone()))
    }

    /// Whether any of the wheel's tags is among the given tags.
    pub fn supported<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> bool {
        tags.into_iter().any(|tag| self.file_tags.contains(tag))
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn simple() {
        let wheel = WheelFilename::from_str("sampleproject-1.2.0-py3-none-any.whl").unwrap();
        assert_eq!(wheel.name, "sampleproject");
        assert_eq!(wheel.version, "1.2.0");
        assert_eq!(wheel.build_tag, None);
        assert_eq!(wheel.get_formatted_file_tags(), vec!["py3-none-any"]);
    }

    #[test]
    fn build_tag_and_compressed_tags() {
        let wheel =
            WheelFilename::from_str("Foo_Bar-1.0_post1-1a-py2.py3-none-MANYLINUX1_x86_64.whl")
                .unwrap();
        assert_eq!(wheel.name, "Foo-Bar");
        assert_eq!(wheel.version, "1.0-post1");
        assert_eq!(wheel.build_tag.as_deref(), Some("1a"));
        insta::assert_debug_snapshot!(wheel.get_formatted_file_tags(), @r###"
        [
            "py2-none-manylinux1_x86_64",
            "py3-none-manylinux1_x86_64",
        ]
        "###);
    }

    #[test]
    fn dist_info() {
        let wheel = WheelFilename::from_str("foo-1.0.dist-info").unwrap();
        assert_eq!(wheel.name, "foo");
        assert_eq!(wheel.version, "1.0");
        assert!(wheel.pyversions.is_empty());
        assert!(wheel.file_tags.is_empty());
    }

    #[test_case("foo.whl")]
    #[test_case("foo-1.0.whl")]
    #[test_case("foo-1.0.tar.gz")]
    fn invalid(filename: &str) {
        let err = WheelFilename::from_str(filename).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("{filename} is not a valid wheel filename.")
        );
    }

    #[test]
    fn support_index() {
        let wheel = WheelFilename::from_str("pkg-1.0-py2.py3-none-any.whl").unwrap();
        let tags = [
            Tag::new("cp39", "cp39", "manylinux1_x86_64"),
            Tag::new("py3", "none", "any"),
            Tag::new("py2", "none", "any"),
        ];
        assert_eq!(wheel.support_index_min(&tags), Ok(1));
        assert!(wheel.supported(&tags));

        let priorities: FxHashMap<Tag, usize> = tags
            .iter()
            .cloned()
            .enumerate()
            .map(|(priority, tag)| (tag, priority))
            .collect();
        assert_eq!(wheel.find_most_preferred_tag(&priorities), Ok(1));
    }

    #[test]
    fn unsupported() {
        let wheel = WheelFilename::from_str("pkg-1.0-cp27-cp27mu-linux_x86_64.whl").unwrap();
        let tags = [Tag::new("py3", "none", "any")];
        assert!(!wheel.supported(&tags));
        let err = wheel.support_index_min(&tags).unwrap_err();
        insta::assert_snapshot!(err, @"pkg-1.0-cp27-cp27mu-linux_x86_64.whl is not a supported wheel on this platform.");
    }
}
