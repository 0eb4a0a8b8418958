use std::collections::BTreeSet;

use serde::Serialize;

use pipreq_normalize::canonicalize_name;

use crate::error::CommandError;

/// Matches every package.
pub const ALL: &str = ":all:";
/// Resets the set it is given to.
pub const NONE: &str = ":none:";

/// A kind of distribution a package may be installed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Binary,
    Source,
}

/// Which packages must not be installed from wheels, and which only from wheels.
///
/// Both sets hold canonical package names or the [`ALL`] sentinel. A name is never in both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormatControl {
    pub no_binary: BTreeSet<String>,
    pub only_binary: BTreeSet<String>,
}

/// One of the two sets of a [`FormatControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryTarget {
    NoBinary,
    OnlyBinary,
}

impl FormatControl {
    /// Apply a `--no-binary` or `--only-binary` value.
    pub(crate) fn update(&mut self, target: BinaryTarget, value: &str) -> Result<(), CommandError> {
        let (target, other) = match target {
            BinaryTarget::NoBinary => (&mut self.no_binary, &mut self.only_binary),
            BinaryTarget::OnlyBinary => (&mut self.only_binary, &mut self.no_binary),
        };
        Self::handle_mutual_excludes(value, target, other)
    }

    /// Add the comma separated names in `value` to `target`, removing them from `other`.
    ///
    /// `:all:` replaces both sets with `{:all:}` in `target`, discarding the names before it.
    /// Unless a `:none:` follows, the rest of the value is ignored. `:none:` clears `target`.
    pub fn handle_mutual_excludes(
        value: &str,
        target: &mut BTreeSet<String>,
        other: &mut BTreeSet<String>,
    ) -> Result<(), CommandError> {
        if value.starts_with('-') {
            return Err(CommandError(
                "--no-binary / --only-binary option requires 1 argument.".to_string(),
            ));
        }
        let mut names: Vec<&str> = value.split(',').collect();
        while let Some(position) = names.iter().position(|name| *name == ALL) {
            other.clear();
            target.clear();
            target.insert(ALL.to_string());
            names.drain(..=position);
            if !names.contains(&NONE) {
                return Ok(());
            }
        }
        for name in names {
            if name == NONE {
                target.clear();
                continue;
            }
            let name = canonicalize_name(name);
            other.remove(&name);
            target.insert(name);
        }
        Ok(())
    }

    /// The formats allowed for a canonical package name. An explicit name wins over `:all:`, and
    /// `only_binary` wins over `no_binary`.
    pub fn get_allowed_formats(&self, canonical_name: &str) -> BTreeSet<Format> {
        let mut result = BTreeSet::from([Format::Binary, Format::Source]);
        if self.only_binary.contains(canonical_name) {
            result.remove(&Format::Source);
        } else if self.no_binary.contains(canonical_name) {
            result.remove(&Format::Binary);
        } else if self.only_binary.contains(ALL) {
            result.remove(&Format::Source);
        } else if self.no_binary.contains(ALL) {
            result.remove(&Format::Binary);
        }
        result
    }

    /// Equivalent to `--no-binary :all:`.
    pub fn disallow_binaries(&mut self) {
        // `:all:` never fails.
        let _ = self.update(BinaryTarget::NoBinary, ALL);
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn all_then_none_with_name() {
        let mut control = FormatControl::default();
        control.update(BinaryTarget::NoBinary, ":all:").unwrap();
        control.update(BinaryTarget::NoBinary, ":none:,foo").unwrap();
        assert_eq!(control.no_binary, set(&["foo"]));
        assert!(control.only_binary.is_empty());
    }

    #[test]
    fn names_move_between_sets() {
        let mut control = FormatControl::default();
        control.update(BinaryTarget::NoBinary, "Foo_Bar,baz").unwrap();
        control.update(BinaryTarget::OnlyBinary, "foo-bar").unwrap();
        assert_eq!(control.no_binary, set(&["baz"]));
        assert_eq!(control.only_binary, set(&["foo-bar"]));
    }

    #[test_case("a,:all:,b", &[":all:"], &[]; "names after all are ignored")]
    #[test_case("a,:all:,:none:,b", &["b"], &[]; "none after all resets")]
    #[test_case(":all:,:none:,:all:", &[":all:"], &[]; "all twice")]
    #[test_case(":none:", &[], &["x"]; "none keeps other")]
    fn sentinels(value: &str, target: &[&str], other: &[&str]) {
        let mut ours = set(&["a"]);
        let mut theirs = set(&["x"]);
        FormatControl::handle_mutual_excludes(value, &mut ours, &mut theirs).unwrap();
        assert_eq!(ours, set(target));
        assert_eq!(theirs, set(other));
    }

    #[test]
    fn value_looks_like_option() {
        let mut control = FormatControl::default();
        let err = control.update(BinaryTarget::OnlyBinary, "--pre").unwrap_err();
        assert_eq!(
            err.to_string(),
            "--no-binary / --only-binary option requires 1 argument."
        );
    }

    #[test]
    fn allowed_formats() {
        let mut control = FormatControl::default();
        control.update(BinaryTarget::OnlyBinary, ":all:").unwrap();
        control.update(BinaryTarget::NoBinary, "pkg").unwrap();
        assert_eq!(
            control.get_allowed_formats("pkg"),
            BTreeSet::from([Format::Source])
        );
        assert_eq!(
            control.get_allowed_formats("other"),
            BTreeSet::from([Format::Binary])
        );

        control.disallow_binaries();
        assert_eq!(control.no_binary, set(&[":all:"]));
        assert!(control.only_binary.is_empty());
        assert_eq!(
            control.get_allowed_formats("other"),
            BTreeSet::from([Format::Source])
        );
    }
}
