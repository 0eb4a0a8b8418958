use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use tracing::warn;

use crate::version::compare_release;
use crate::{Operator, OperatorParseError, Version, VersionParseError};

/// Version specifiers in the order they were written, such as `>=2.1,<3`.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl std::ops::Deref for VersionSpecifiers {
    type Target = [VersionSpecifier];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl VersionSpecifiers {
    /// Matches all versions.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Whether all specifiers match the given version.
    pub fn contains(&self, version: &Version) -> bool {
        self.iter().all(|specifier| specifier.contains(version))
    }
}

impl FromIterator<VersionSpecifier> for VersionSpecifiers {
    fn from_iter<T: IntoIterator<Item = VersionSpecifier>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionSpecifiersParseError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut specifiers = Vec::new();
        if spec.trim().is_empty() {
            return Ok(Self(specifiers));
        }
        let mut start = 0;
        for part in spec.split(',') {
            let specifier =
                VersionSpecifier::from_str(part).map_err(|err| VersionSpecifiersParseError {
                    err,
                    line: spec.to_string(),
                    start,
                    end: start + part.len(),
                })?;
            specifiers.push(specifier);
            start += part.len() + 1;
        }
        Ok(Self(specifiers))
    }
}

impl From<VersionSpecifier> for VersionSpecifiers {
    fn from(specifier: VersionSpecifier) -> Self {
        Self(vec![specifier])
    }
}

impl Display for VersionSpecifiers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (idx, specifier) in self.0.iter().enumerate() {
            if idx == 0 {
                write!(f, "{specifier}")?;
            } else {
                write!(f, ",{specifier}")?;
            }
        }
        Ok(())
    }
}

impl Serialize for VersionSpecifiers {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionSpecifiers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// A single failing clause within a list of version specifiers.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VersionSpecifiersParseError {
    err: VersionSpecifierParseError,
    line: String,
    start: usize,
    end: usize,
}

impl VersionSpecifiersParseError {
    /// The specific clause error.
    pub fn inner(&self) -> &VersionSpecifierParseError {
        &self.err
    }
}

impl std::error::Error for VersionSpecifiersParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.err)
    }
}

impl Display for VersionSpecifiersParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Failed to parse version: {}:", self.err)?;
        writeln!(f, "{}", self.line)?;
        let indent = self.line[..self.start].chars().count();
        let point = self.line[self.start..self.end].chars().count().max(1);
        write!(f, "{}{}", " ".repeat(indent), "^".repeat(point))
    }
}

/// A version range such as `>1.2.3`, `<=4!5.6.7-a8.post9.dev0` or `== 4.1.*`.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct VersionSpecifier {
    /// ~=|==|!=|<=|>=|<|>|===, plus whether the version ended with a star
    pub(crate) operator: Operator,
    /// The whole version part behind the operator
    pub(crate) version: Version,
}

impl VersionSpecifier {
    /// Create a new version specifier from an operator and a version, validating that the
    /// combination is allowed.
    pub fn new(
        operator: Operator,
        version: Version,
        star: bool,
    ) -> Result<Self, VersionSpecifierParseError> {
        let operator = if star {
            operator
                .to_star()
                .ok_or(VersionSpecifierParseError::OperatorWithStar(operator))?
        } else {
            operator
        };

        // "Local version identifiers are NOT permitted in this version specifier."
        if version.is_local() && !operator.is_local_compatible() {
            return Err(VersionSpecifierParseError::OperatorLocalCombo(operator));
        }

        if operator == Operator::TildeEqual && version.release.len() < 2 {
            return Err(VersionSpecifierParseError::CompatibleRelease);
        }

        Ok(Self { operator, version })
    }

    /// `==<version>`
    pub fn equals_version(version: Version) -> Self {
        Self {
            operator: Operator::Equal,
            version,
        }
    }

    /// Get the operator, e.g. `>=` in `>= 2.0.0`
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// Get the version, e.g. `2.0.0` in `<= 2.0.0`
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether the version marker includes a prerelease.
    pub fn any_prerelease(&self) -> bool {
        self.version.any_prerelease()
    }

    /// Whether the given version satisfies the version range.
    ///
    /// See:
    /// - <https://peps.python.org/pep-0440/#version-specifiers>
    /// - <https://github.com/pypa/packaging/blob/e184feef1a28a5c574ec41f5c263a3a573861f5a/packaging/specifiers.py#L362-L496>
    pub fn contains(&self, version: &Version) -> bool {
        // "Except where specifically noted below, local version identifiers MUST NOT be permitted
        // in version specifiers, and local version labels MUST be ignored entirely when checking
        // if candidate versions match a given version specifier."
        let (this, other) = if self.version.is_local() {
            (self.version.clone(), version.clone())
        } else {
            (self.version.clone(), version.without_local())
        };

        match self.operator {
            Operator::Equal => other == this,
            Operator::EqualStar => {
                this.epoch == other.epoch
                    && this
                        .release
                        .iter()
                        .zip(other.release.iter().chain(std::iter::repeat(&0)))
                        .all(|(this, other)| this == other)
            }
            Operator::ExactEqual => {
                warn!("Using arbitrary equality (`===`) is discouraged");
                self.version.to_string() == version.to_string()
            }
            Operator::NotEqual => other != this,
            Operator::NotEqualStar => {
                this.epoch != other.epoch
                    || !this
                        .release
                        .iter()
                        .zip(other.release.iter().chain(std::iter::repeat(&0)))
                        .all(|(this, other)| this == other)
            }
            Operator::TildeEqual => {
                // "For a given release identifier V.N, the compatible release clause is
                // approximately equivalent to the pair of comparison clauses: `>= V.N, == V.*`"
                if this.epoch != other.epoch {
                    return false;
                }
                let prefix = &this.release[..this.release.len().saturating_sub(1)];
                if !prefix
                    .iter()
                    .zip(other.release.iter().chain(std::iter::repeat(&0)))
                    .all(|(this, other)| this == other)
                {
                    return false;
                }
                other >= this
            }
            Operator::GreaterThan => Self::greater_than(&this, &other),
            Operator::GreaterThanEqual => Self::greater_than(&this, &other) || other >= this,
            Operator::LessThan => {
                Self::less_than(&this, &other)
                    && !(compare_release(&this.release, &other.release) == Ordering::Equal
                        && other.any_prerelease())
            }
            Operator::LessThanEqual => Self::less_than(&this, &other) || other <= this,
        }
    }

    fn less_than(this: &Version, other: &Version) -> bool {
        if other.epoch < this.epoch {
            return true;
        }

        // Unless the specifier itself is a pre-release, `<3.1` does not match `3.1.dev0`, but does
        // match `3.0.dev0`.
        if !this.any_prerelease()
            && other.is_pre()
            && compare_release(&this.release, &other.release) == Ordering::Equal
        {
            return false;
        }

        other < this
    }

    fn greater_than(this: &Version, other: &Version) -> bool {
        if other.epoch > this.epoch {
            return true;
        }

        if compare_release(&this.release, &other.release) == Ordering::Equal {
            // `>3.1` does not match `3.1.post0` unless the specifier is a post-release itself.
            if !this.is_post() && other.is_post() {
                return false;
            }

            if other.is_local() {
                return false;
            }
        }

        other > this
    }
}

impl FromStr for VersionSpecifier {
    type Err = VersionSpecifierParseError;

    /// Parses a version such as `>= 1.19`, `== 1.1.*`,`~=1.0+abc.5` or `<=1!2012.2`
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut s = unscanny::Scanner::new(spec);
        s.eat_whitespace();
        // operator but we don't know yet if it has a star
        let operator = s.eat_while(['=', '!', '~', '<', '>']);
        if operator.is_empty() {
            return Err(VersionSpecifierParseError::MissingOperator);
        }
        let operator = Operator::from_str(operator)?;
        s.eat_whitespace();
        let version = s.eat_while(|c: char| !c.is_whitespace());
        if version.is_empty() {
            return Err(VersionSpecifierParseError::MissingVersion);
        }
        let (version, star) = Version::from_str_star(version)?;
        let specifier = Self::new(operator, version, star)?;
        s.eat_whitespace();
        if !s.done() {
            return Err(VersionSpecifierParseError::InvalidTrailing(
                s.after().to_string(),
            ));
        }
        Ok(specifier)
    }
}

impl Display for VersionSpecifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.operator == Operator::EqualStar || self.operator == Operator::NotEqualStar {
            return write!(f, "{}{}.*", self.operator, self.version);
        }
        write!(f, "{}{}", self.operator, self.version)
    }
}

impl Serialize for VersionSpecifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// An error that can occur when parsing or constructing a single version specifier.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum VersionSpecifierParseError {
    #[error(transparent)]
    InvalidOperator(#[from] OperatorParseError),
    #[error(transparent)]
    InvalidVersion(#[from] VersionParseError),
    #[error("Operator {0} cannot be used with a wildcard version specifier")]
    OperatorWithStar(Operator),
    #[error("Operator {0} is incompatible with versions containing non-empty local segments")]
    OperatorLocalCombo(Operator),
    #[error("The ~= operator requires at least two segments in the release version")]
    CompatibleRelease,
    #[error("Unexpected end of version specifier, expected operator")]
    MissingOperator,
    #[error("Unexpected end of version specifier, expected version")]
    MissingVersion,
    #[error("Trailing `{0}` is not allowed")]
    InvalidTrailing(String),
}
