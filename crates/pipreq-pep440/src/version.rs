use std::cmp::{Ordering, max};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::iter;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use tracing::warn;

/// A regex copied from <https://peps.python.org/pep-0440/#appendix-b-parsing-version-strings-with-regular-expressions>,
/// updated to support stars for version ranges
const VERSION_RE_INNER: &str = r"
(?:
    (?:v?)                                            # <https://peps.python.org/pep-0440/#preceding-v-character>
    (?:(?P<epoch>[0-9]+)!)?                           # epoch
    (?P<release>[0-9*]+(?:\.[0-9]+)*)                 # release segment
    (?P<pre_field>                                    # pre-release
        [-_\.]?
        (?P<pre_name>(a|b|c|rc|alpha|beta|pre|preview))
        [-_\.]?
        (?P<pre>[0-9]+)?
    )?
    (?P<post_field>                                   # post release
        (?:-(?P<post_old>[0-9]+))
        |
        (?:
            [-_\.]?
            (?P<post_l>post|rev|r)
            [-_\.]?
            (?P<post_new>[0-9]+)?
        )
    )?
    (?P<dev_field>                                    # dev release
        [-_\.]?
        (?P<dev_l>dev)
        [-_\.]?
        (?P<dev>[0-9]+)?
    )?
)
(?:\+(?P<local>[a-z0-9]+(?:[-_\.][a-z0-9]+)*))?       # local version
(?P<trailing_dot_star>\.\*)?                          # allow for version matching `.*`
";

/// Matches a python version, such as `1.19.a1`. Based on the PEP 440 regex
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?xi)^(?:\s*){VERSION_RE_INNER}(?:\s*)$")).unwrap()
});

/// One of `~=` `==` `!=` `<=` `>=` `<` `>` `===`
#[derive(Eq, PartialEq, Debug, Hash, Clone, Copy, Ord, PartialOrd)]
pub enum Operator {
    /// `== 1.2.3`
    Equal,
    /// `== 1.2.*`
    EqualStar,
    /// `===` (discouraged)
    ///
    /// <https://peps.python.org/pep-0440/#arbitrary-equality>
    ExactEqual,
    /// `!= 1.2.3`
    NotEqual,
    /// `!= 1.2.*`
    NotEqualStar,
    /// `~=`
    TildeEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
}

impl Operator {
    /// The star variant of this operator, if it has one.
    pub(crate) fn to_star(self) -> Option<Self> {
        match self {
            Self::Equal => Some(Self::EqualStar),
            Self::NotEqual => Some(Self::NotEqualStar),
            _ => None,
        }
    }

    /// Whether the operator may be combined with a local version.
    pub(crate) fn is_local_compatible(self) -> bool {
        !matches!(
            self,
            Self::GreaterThan
                | Self::GreaterThanEqual
                | Self::LessThan
                | Self::LessThanEqual
                | Self::TildeEqual
                | Self::EqualStar
                | Self::NotEqualStar
        )
    }
}

/// An operator that is not one of the eight PEP 440 comparison operators.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("No such comparison operator '{0}', must be one of ~= == != <= >= < > ===")]
pub struct OperatorParseError(String);

impl FromStr for Operator {
    type Err = OperatorParseError;

    /// Notably, this does not know about star versions, it just assumes the base operator
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let operator = match s {
            "==" => Self::Equal,
            "===" => {
                warn!("Using arbitrary equality (`===`) is discouraged");
                Self::ExactEqual
            }
            "!=" => Self::NotEqual,
            "~=" => Self::TildeEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessThanEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterThanEqual,
            other => return Err(OperatorParseError(other.to_string())),
        };
        Ok(operator)
    }
}

impl Display for Operator {
    /// Note the `EqualStar` is also `==`.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let operator = match self {
            Self::Equal | Self::EqualStar => "==",
            Self::ExactEqual => "===",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::TildeEqual => "~=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
        };

        write!(f, "{operator}")
    }
}

/// Optional prerelease modifier (alpha, beta or release candidate) appended to version
///
/// <https://peps.python.org/pep-0440/#pre-releases>
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy, Ord, PartialOrd)]
pub enum PreRelease {
    /// alpha prerelease
    Alpha,
    /// beta prerelease
    Beta,
    /// release candidate prerelease
    Rc,
}

impl PreRelease {
    fn parse(prerelease: &str) -> Option<Self> {
        match prerelease.to_lowercase().as_str() {
            "a" | "alpha" => Some(Self::Alpha),
            "b" | "beta" => Some(Self::Beta),
            "c" | "rc" | "pre" | "preview" => Some(Self::Rc),
            _ => None,
        }
    }
}

impl Display for PreRelease {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alpha => write!(f, "a"),
            Self::Beta => write!(f, "b"),
            Self::Rc => write!(f, "rc"),
        }
    }
}

/// A part of the [local version identifier](<https://peps.python.org/pep-0440/#local-version-identifiers>)
///
/// Numeric segments compare as integers and always sort above string segments. A local version
/// with more segments sorts above one with fewer segments if the shorter one is a prefix, which
/// the default `Ord` implementation for `Vec<LocalSegment>` already does.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum LocalSegment {
    /// Not-parseable as integer segment of local version
    String(String),
    /// Inferred integer segment of local version
    Number(u64),
}

impl Display for LocalSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(string) => write!(f, "{string}"),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(n1), Self::Number(n2)) => n1.cmp(n2),
            (Self::String(s1), Self::String(s2)) => s1.cmp(s2),
            (Self::Number(_), Self::String(_)) => Ordering::Greater,
            (Self::String(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

/// A version number such as `1.2.3` or `4!5.6.7-a8.post9.dev0`.
///
/// Beware that the sorting implemented with [Ord] and [Eq] is not consistent with the operators
/// from PEP 440, i.e. compare two versions in rust with `>` gives a different result than a
/// `VersionSpecifier` with `>` as operator.
#[derive(Debug, Clone)]
pub struct Version {
    /// The [versioning epoch](https://peps.python.org/pep-0440/#version-epochs). Normally just 0.
    pub epoch: u64,
    /// The normal number part of the version, such a `1.2.3` in `4!1.2.3-a8.post9.dev1`
    pub release: Vec<u64>,
    /// The [prerelease](https://peps.python.org/pep-0440/#pre-releases), i.e. alpha, beta or rc
    /// plus a number
    pub pre: Option<(PreRelease, u64)>,
    /// The [Post release version](https://peps.python.org/pep-0440/#post-releases)
    pub post: Option<u64>,
    /// The [developmental release](https://peps.python.org/pep-0440/#developmental-releases)
    pub dev: Option<u64>,
    /// A [local version identifier](https://peps.python.org/pep-0440/#local-version-identifiers)
    /// such as `+deadbeef` in `1.2.3+deadbeef`
    pub local: Option<Vec<LocalSegment>>,
}

impl Version {
    /// Constructor for a version that is just a release such as `3.8`
    pub fn from_release(release: Vec<u64>) -> Self {
        Self {
            epoch: 0,
            release,
            pre: None,
            post: None,
            dev: None,
            local: None,
        }
    }

    /// Local version labels are ignored entirely when matching against a specifier without one.
    pub(crate) fn without_local(&self) -> Self {
        Self {
            local: None,
            ..self.clone()
        }
    }

    /// Whether this is an alpha/beta/rc or dev version
    pub fn any_prerelease(&self) -> bool {
        self.is_pre() || self.is_dev()
    }

    /// Whether this is an alpha/beta/rc version
    pub fn is_pre(&self) -> bool {
        self.pre.is_some()
    }

    /// Whether this is a dev version
    pub fn is_dev(&self) -> bool {
        self.dev.is_some()
    }

    /// Whether this is a post version
    pub fn is_post(&self) -> bool {
        self.post.is_some()
    }

    /// Whether this is a local version (e.g. `1.2.3+localsuffixesareweird`)
    pub fn is_local(&self) -> bool {
        self.local.is_some()
    }

    /// Like [`Self::from_str`], but also allows the version to end with a star and returns whether
    /// it did. This variant is for use in specifiers.
    ///  * `1.2.3` -> false
    ///  * `1.2.3.*` -> true
    ///  * `1.2.*.4` -> err
    ///  * `1.0-dev1.*` -> err
    pub fn from_str_star(version: &str) -> Result<(Self, bool), VersionParseError> {
        let captures = VERSION_RE
            .captures(version)
            .ok_or_else(|| VersionParseError::NoMatch(version.to_string()))?;
        Self::parse_impl(&captures)
    }

    fn parse_impl(captures: &Captures) -> Result<(Self, bool), VersionParseError> {
        let number_field = |field_name: &str| -> Result<Option<u64>, VersionParseError> {
            captures
                .name(field_name)
                .map(|field| {
                    field
                        .as_str()
                        .parse::<u64>()
                        .map_err(|_| VersionParseError::InvalidNumber(field.as_str().to_string()))
                })
                .transpose()
        };
        // "If no explicit epoch is given, the implicit epoch is 0"
        let epoch = number_field("epoch")?.unwrap_or_default();
        let pre = captures
            .name("pre_name")
            .and_then(|pre| PreRelease::parse(pre.as_str()))
            .map(|kind| Ok::<_, VersionParseError>((kind, number_field("pre")?.unwrap_or_default())))
            .transpose()?;
        let post = if captures.name("post_field").is_some() {
            // packaging treats a bare `.post` as `.post0`
            Some(
                number_field("post_new")?
                    .or(number_field("post_old")?)
                    .unwrap_or_default(),
            )
        } else {
            None
        };
        let dev = if captures.name("dev_field").is_some() {
            Some(number_field("dev")?.unwrap_or_default())
        } else {
            None
        };
        let local = captures.name("local").map(|local| {
            local
                .as_str()
                .split(['-', '_', '.'])
                .map(|segment| {
                    if let Ok(number) = segment.parse::<u64>() {
                        LocalSegment::Number(number)
                    } else {
                        LocalSegment::String(segment.to_lowercase())
                    }
                })
                .collect()
        });
        let release_text = captures
            .name("release")
            .map(|release| release.as_str())
            .unwrap_or_default();
        let release = release_text
            .split('.')
            .map(|segment| {
                segment
                    .parse::<u64>()
                    .map_err(|_| VersionParseError::StarInRelease(release_text.to_string()))
            })
            .collect::<Result<Vec<u64>, _>>()?;

        let star = captures.name("trailing_dot_star").is_some();
        if star {
            if pre.is_some() {
                return Err(VersionParseError::StarWith("prerelease"));
            }
            if post.is_some() {
                return Err(VersionParseError::StarWith("post"));
            }
            if dev.is_some() {
                return Err(VersionParseError::StarWith("dev"));
            }
            if local.is_some() {
                return Err(VersionParseError::StarWith("local"));
            }
        }

        let version = Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        };
        Ok((version, star))
    }
}

/// A version string that does not follow PEP 440.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum VersionParseError {
    /// The string does not match the PEP 440 grammar.
    #[error("Version `{0}` doesn't match PEP 440 rules")]
    NoMatch(String),
    /// A numeric segment overflows.
    #[error("Couldn't parse `{0}` as a number")]
    InvalidNumber(String),
    /// A `*` appears inside the release segment.
    #[error("A star (`*`) is only allowed as a trailing `.*` (in `{0}`)")]
    StarInRelease(String),
    /// A trailing `.*` combined with another version part.
    #[error("You can't have both a trailing `.*` and a {0} version")]
    StarWith(&'static str),
    /// A trailing `.*` where a fixed version is expected.
    #[error("A star (`*`) must not be used in a fixed version")]
    UnexpectedStar,
}

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parses a version such as `1.19`, `1.0a1`,`1.0+abc.5` or `1!2012.2`
    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let (version, star) = Self::from_str_star(version)?;
        if star {
            return Err(VersionParseError::UnexpectedStar);
        }
        Ok(version)
    }
}

/// Shows normalized version
impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release = self
            .release
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<String>>()
            .join(".");
        write!(f, "{release}")?;
        if let Some((kind, number)) = &self.pre {
            write!(f, "{kind}{number}")?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        if let Some(local) = &self.local {
            let local = local
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<String>>()
                .join(".");
            write!(f, "+{local}")?;
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// Compare the release parts of two versions, e.g. `4.3.1` > `4.2`, `1.1.0` == `1.1` and
/// `1.16` < `1.19`
pub(crate) fn compare_release(this: &[u64], other: &[u64]) -> Ordering {
    // "When comparing release segments with different numbers of components, the shorter segment
    // is padded out with additional zeros as necessary"
    let len = max(this.len(), other.len());
    this.iter()
        .chain(iter::repeat(&0))
        .zip(other.iter().chain(iter::repeat(&0)))
        .take(len)
        .map(|(this, other)| this.cmp(other))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Compare the parts attached after the release, given equal release
///
/// The order of pre/post-releases is `.devN, aN, bN, rcN, <no suffix (final)>, .postN`, but
/// dev and post releases can also be attached to pre-releases, which makes a three stage ordering:
/// ({dev: 0, a: 1, b: 2, rc: 3, (): 4, post: 5}, <preN>, <postN or None as smallest>,
/// <devN or Max as largest>, <local>)
fn sortable_tuple(version: &Version) -> (u64, u64, Option<u64>, u64, Option<&[LocalSegment]>) {
    let local = version.local.as_deref();
    match (&version.pre, &version.post, &version.dev) {
        (None, None, Some(n)) => (0, 0, None, *n, local),
        (Some((PreRelease::Alpha, n)), post, dev) => {
            (1, *n, *post, dev.unwrap_or(u64::MAX), local)
        }
        (Some((PreRelease::Beta, n)), post, dev) => (2, *n, *post, dev.unwrap_or(u64::MAX), local),
        (Some((PreRelease::Rc, n)), post, dev) => (3, *n, *post, dev.unwrap_or(u64::MAX), local),
        (None, None, None) => (4, 0, None, 0, local),
        (None, Some(post), dev) => (5, 0, Some(*post), dev.unwrap_or(u64::MAX), local),
    }
}

impl PartialEq<Self> for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    /// Custom implementation to ignoring trailing zero because `PartialEq` zero pads
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        for segment in self.release.iter().rev().skip_while(|segment| **segment == 0) {
            segment.hash(state);
        }
        self.pre.hash(state);
        self.dev.hash(state);
        self.post.hash(state);
        self.local.hash(state);
    }
}

impl PartialOrd<Self> for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    /// 1.0.dev456 < 1.0a1 < 1.0a2.dev456 < 1.0a12.dev456 < 1.0a12 < 1.0b1.dev456 < 1.0b2
    /// < 1.0b2.post345.dev456 < 1.0b2.post345 < 1.0b2-346 < 1.0c1.dev456 < 1.0c1 < 1.0rc2 < 1.0c3
    /// < 1.0 < 1.0.post456.dev34 < 1.0.post456
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| sortable_tuple(self).cmp(&sortable_tuple(other)))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use test_case::test_case;

    use super::{Version, VersionParseError};

    #[test]
    fn ordering() {
        let versions = [
            "1.0.dev456",
            "1.0a1",
            "1.0a2.dev456",
            "1.0a12.dev456",
            "1.0a12",
            "1.0b1.dev456",
            "1.0b2",
            "1.0b2.post345.dev456",
            "1.0b2.post345",
            "1.0c1.dev456",
            "1.0c1",
            "1.0rc2",
            "1.0",
            "1.0.post456.dev34",
            "1.0.post456",
            "1.1.dev1",
            "1.2+123abc",
            "1.2+abc",
            "1.2+abc123",
            "1.2+1234.abc",
            "1.2+123456",
            "1!1.0.dev456",
        ];
        for pair in versions.windows(2) {
            let lower = Version::from_str(pair[0]).unwrap();
            let higher = Version::from_str(pair[1]).unwrap();
            assert!(lower < higher, "{lower} < {higher}");
        }
    }

    #[test_case("1.0dev", "1.0.dev0")]
    #[test_case("1.0-A1", "1.0a1")]
    #[test_case("1.0.BETA", "1.0b0")]
    #[test_case("1.0c1", "1.0rc1")]
    #[test_case("1.0-1", "1.0.post1")]
    #[test_case("1.0.r4", "1.0.post4")]
    #[test_case("v1.0", "1.0")]
    #[test_case("1.0+Ubuntu-1", "1.0+ubuntu.1")]
    #[test_case("  1.0  ", "1.0")]
    fn normalization(input: &str, expected: &str) {
        assert_eq!(Version::from_str(input).unwrap().to_string(), expected);
    }

    #[test]
    fn trailing_zeros_are_equal() {
        assert_eq!(
            Version::from_str("1.1").unwrap(),
            Version::from_str("1.1.0.0").unwrap()
        );
    }

    #[test]
    fn failures() {
        for version in ["french toast", "1.0+a+", "1.0++", "1.0+_foobar", "1.0+foo&asd"] {
            assert_eq!(
                Version::from_str(version).unwrap_err(),
                VersionParseError::NoMatch(version.to_string())
            );
        }
    }

    #[test]
    fn star() {
        assert_eq!(
            Version::from_str_star("1.2.*").unwrap(),
            (Version::from_release(vec![1, 2]), true)
        );
        assert_eq!(
            Version::from_str("1.2.*").unwrap_err(),
            VersionParseError::UnexpectedStar
        );
        assert_eq!(
            Version::from_str_star("1.0.dev1.*").unwrap_err(),
            VersionParseError::StarWith("dev")
        );
    }
}
