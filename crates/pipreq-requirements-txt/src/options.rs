//! The options a requirements file line may carry, decoded the way `optparse` does.
//!
//! Each line gets a fresh [`LineOptions`], so appending options start empty, while
//! `--no-binary`/`--only-binary` update the [`FormatControl`] shared by the whole parse.

use std::collections::{BTreeMap, VecDeque};

use crate::error::{InstallationError, OptionError};
use crate::format_control::{BinaryTarget, FormatControl};
use crate::shquote;

/// The values accepted by `--use-feature`.
pub const FEATURE_CHOICES: [&str; 3] = ["2020-resolver", "fast-deps", "in-tree-build"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    NoIndex,
    PreferBinary,
    RequireHashes,
    Pre,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Store {
    IndexUrl,
    ExtraIndexUrl,
    Constraint,
    Requirement,
    Editable,
    FindLinks,
    NoBinary,
    OnlyBinary,
    TrustedHost,
    UseFeature,
    InstallOption,
    GlobalOption,
    Hash,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Flag(Flag),
    Store(Store),
}

struct OptionSpec {
    short: Option<char>,
    long: &'static [&'static str],
    action: Action,
}

const OPTIONS: [OptionSpec; 17] = [
    OptionSpec {
        short: Some('i'),
        long: &["--index-url", "--pypi-url"],
        action: Action::Store(Store::IndexUrl),
    },
    OptionSpec {
        short: None,
        long: &["--extra-index-url"],
        action: Action::Store(Store::ExtraIndexUrl),
    },
    OptionSpec {
        short: None,
        long: &["--no-index"],
        action: Action::Flag(Flag::NoIndex),
    },
    OptionSpec {
        short: Some('c'),
        long: &["--constraint"],
        action: Action::Store(Store::Constraint),
    },
    OptionSpec {
        short: Some('r'),
        long: &["--requirement"],
        action: Action::Store(Store::Requirement),
    },
    OptionSpec {
        short: Some('e'),
        long: &["--editable"],
        action: Action::Store(Store::Editable),
    },
    OptionSpec {
        short: Some('f'),
        long: &["--find-links"],
        action: Action::Store(Store::FindLinks),
    },
    OptionSpec {
        short: None,
        long: &["--no-binary"],
        action: Action::Store(Store::NoBinary),
    },
    OptionSpec {
        short: None,
        long: &["--only-binary"],
        action: Action::Store(Store::OnlyBinary),
    },
    OptionSpec {
        short: None,
        long: &["--prefer-binary"],
        action: Action::Flag(Flag::PreferBinary),
    },
    OptionSpec {
        short: None,
        long: &["--require-hashes"],
        action: Action::Flag(Flag::RequireHashes),
    },
    OptionSpec {
        short: None,
        long: &["--pre"],
        action: Action::Flag(Flag::Pre),
    },
    OptionSpec {
        short: None,
        long: &["--trusted-host"],
        action: Action::Store(Store::TrustedHost),
    },
    OptionSpec {
        short: None,
        long: &["--use-feature"],
        action: Action::Store(Store::UseFeature),
    },
    OptionSpec {
        short: None,
        long: &["--install-option"],
        action: Action::Store(Store::InstallOption),
    },
    OptionSpec {
        short: None,
        long: &["--global-option"],
        action: Action::Store(Store::GlobalOption),
    },
    OptionSpec {
        short: None,
        long: &["--hash"],
        action: Action::Store(Store::Hash),
    },
];

/// Resolve a long option, allowing any unambiguous prefix.
fn match_long_opt(opt: &str) -> Result<(&'static str, Action), OptionError> {
    let mut possibilities: Vec<(&'static str, Action)> = Vec::new();
    for spec in &OPTIONS {
        for &long in spec.long {
            if long == opt {
                return Ok((long, spec.action));
            }
            if long.starts_with(opt) {
                possibilities.push((long, spec.action));
            }
        }
    }
    match possibilities.as_slice() {
        [] => Err(OptionError::NoSuchOption(opt.to_string())),
        [single] => Ok(*single),
        _ => {
            let mut possibilities = possibilities
                .into_iter()
                .map(|(long, _)| long.to_string())
                .collect::<Vec<_>>();
            possibilities.sort();
            Err(OptionError::Ambiguous {
                option: opt.to_string(),
                possibilities,
            })
        }
    }
}

fn match_short_opt(ch: char) -> Option<Action> {
    OPTIONS
        .iter()
        .find(|spec| spec.short == Some(ch))
        .map(|spec| spec.action)
}

/// The options found on a single line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LineOptions {
    pub(crate) index_url: Option<String>,
    pub(crate) extra_index_urls: Vec<String>,
    pub(crate) no_index: bool,
    pub(crate) constraints: Vec<String>,
    pub(crate) requirements: Vec<String>,
    pub(crate) editables: Vec<String>,
    pub(crate) find_links: Vec<String>,
    pub(crate) prefer_binary: bool,
    pub(crate) require_hashes: bool,
    pub(crate) pre: bool,
    pub(crate) trusted_hosts: Vec<String>,
    pub(crate) features_enabled: Vec<String>,
    pub(crate) install_options: Vec<String>,
    pub(crate) global_options: Vec<String>,
    /// `--hash` values by algorithm. A value without a `:` has no digest.
    pub(crate) hashes: BTreeMap<String, Vec<Option<String>>>,
}

impl LineOptions {
    fn set(&mut self, flag: Flag) {
        match flag {
            Flag::NoIndex => self.no_index = true,
            Flag::PreferBinary => self.prefer_binary = true,
            Flag::RequireHashes => self.require_hashes = true,
            Flag::Pre => self.pre = true,
        }
    }

    fn store(
        &mut self,
        store: Store,
        opt: &str,
        value: String,
        format_control: &mut FormatControl,
    ) -> Result<(), InstallationError> {
        match store {
            Store::IndexUrl => self.index_url = Some(value),
            Store::ExtraIndexUrl => self.extra_index_urls.push(value),
            Store::Constraint => self.constraints.push(value),
            Store::Requirement => self.requirements.push(value),
            Store::Editable => self.editables.push(value),
            Store::FindLinks => self.find_links.push(value),
            Store::TrustedHost => self.trusted_hosts.push(value),
            Store::InstallOption => self.install_options.push(value),
            Store::GlobalOption => self.global_options.push(value),
            Store::NoBinary => format_control.update(BinaryTarget::NoBinary, &value)?,
            Store::OnlyBinary => format_control.update(BinaryTarget::OnlyBinary, &value)?,
            Store::UseFeature => {
                if !FEATURE_CHOICES.contains(&value.as_str()) {
                    return Err(OptionError::InvalidChoice {
                        option: opt.to_string(),
                        value,
                        choices: &FEATURE_CHOICES,
                    }
                    .into());
                }
                self.features_enabled.push(value);
            }
            Store::Hash => {
                let (algorithm, digest) = match value.split_once(':') {
                    Some((algorithm, digest)) => (algorithm.to_string(), Some(digest.to_string())),
                    None => (value, None),
                };
                self.hashes.entry(algorithm).or_default().push(digest);
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        action: Action,
        opt: &str,
        value: Option<String>,
        format_control: &mut FormatControl,
    ) -> Result<(), InstallationError> {
        match (action, value) {
            (Action::Flag(flag), None) => {
                self.set(flag);
                Ok(())
            }
            (Action::Flag(_), Some(_)) => Err(OptionError::TakesNoValue(opt.to_string()).into()),
            (Action::Store(store), Some(value)) => self.store(store, opt, value, format_control),
            (Action::Store(_), None) => Err(OptionError::RequiresArgument(opt.to_string()).into()),
        }
    }
}

/// Split a line into the requirement part and the options part.
///
/// The requirement is everything before the first space separated token starting with `-`. It
/// is kept out of the shell splitting, which would mangle markers.
pub(crate) fn break_args_options(line: &str) -> (String, String) {
    let tokens: Vec<&str> = line.split(' ').collect();
    let split = tokens
        .iter()
        .position(|token| token.starts_with('-'))
        .unwrap_or(tokens.len());
    (tokens[..split].join(" "), tokens[split..].join(" "))
}

/// Decode the options of a line, returning the requirement part and the options.
///
/// Options are applied in order, so a `--no-binary` before an invalid option still takes effect.
pub(crate) fn parse_line(
    line: &str,
    format_control: &mut FormatControl,
) -> Result<(String, LineOptions), InstallationError> {
    let (args, options) = break_args_options(line);
    let mut rargs: VecDeque<String> = shquote::split(&options)
        .map_err(OptionError::from)?
        .into();
    let mut parsed = LineOptions::default();

    while let Some(arg) = rargs.pop_front() {
        if arg == "--" {
            break;
        }
        if arg.starts_with("--") {
            let (opt, explicit) = match arg.split_once('=') {
                Some((opt, value)) => (opt, Some(value.to_string())),
                None => (arg.as_str(), None),
            };
            let (opt, action) = match_long_opt(opt)?;
            let value = match action {
                Action::Store(_) => explicit.or_else(|| rargs.pop_front()),
                Action::Flag(_) => explicit,
            };
            parsed.apply(action, opt, value, format_control)?;
        } else if arg.len() > 1 && arg.starts_with('-') {
            let body = &arg[1..];
            for (index, ch) in body.char_indices() {
                let opt = format!("-{ch}");
                let Some(action) = match_short_opt(ch) else {
                    return Err(OptionError::NoSuchOption(opt).into());
                };
                if let Action::Store(_) = action {
                    let rest = &body[index + ch.len_utf8()..];
                    let value = if rest.is_empty() {
                        rargs.pop_front()
                    } else {
                        Some(rest.to_string())
                    };
                    parsed.apply(action, &opt, value, format_control)?;
                    break;
                }
                parsed.apply(action, &opt, None, format_control)?;
            }
        }
        // Positional arguments after the options are ignored.
    }

    Ok((args, parsed))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn parse(line: &str) -> Result<(String, LineOptions), String> {
        parse_line(line, &mut FormatControl::default()).map_err(|err| err.to_string())
    }

    #[test_case("pkg==1.0", ("pkg==1.0", ""))]
    #[test_case("pkg ; python_version < '3' --hash=sha256:abc", ("pkg ; python_version < '3'", "--hash=sha256:abc"))]
    #[test_case("-r other.txt", ("", "-r other.txt"))]
    #[test_case("pkg  -e x", ("pkg ", "-e x"))]
    fn args_and_options(line: &str, expected: (&str, &str)) {
        let (args, options) = break_args_options(line);
        assert_eq!((args.as_str(), options.as_str()), expected);
    }

    #[test]
    fn short_and_long_forms() {
        let (args, options) = parse("-rbase.txt").unwrap();
        assert_eq!(args, "");
        assert_eq!(options.requirements, vec!["base.txt"]);

        let (_, options) = parse("-i https://a --extra-index-url=https://b --extra-index https://c").unwrap();
        assert_eq!(options.index_url.as_deref(), Some("https://a"));
        assert_eq!(options.extra_index_urls, vec!["https://b", "https://c"]);

        let (_, options) = parse("--pypi-url https://pypi --pre --prefer-binary").unwrap();
        assert_eq!(options.index_url.as_deref(), Some("https://pypi"));
        assert!(options.pre);
        assert!(options.prefer_binary);
    }

    #[test]
    fn hashes_merge_per_algorithm() {
        let (args, options) =
            parse("pkg==1.0 --hash=sha256:d1 --hash sha256:d2 --hash=md5").unwrap();
        assert_eq!(args, "pkg==1.0");
        assert_eq!(
            options.hashes,
            BTreeMap::from([
                ("md5".to_string(), vec![None]),
                (
                    "sha256".to_string(),
                    vec![Some("d1".to_string()), Some("d2".to_string())]
                ),
            ])
        );
    }

    #[test]
    fn quoted_option_values() {
        let (_, options) =
            parse(r#"pkg --install-option="--prefix='/usr/local'" --global-option '--no-user-cfg'"#)
                .unwrap();
        assert_eq!(options.install_options, vec!["--prefix='/usr/local'"]);
        assert_eq!(options.global_options, vec!["--no-user-cfg"]);
    }

    #[test]
    fn value_may_look_like_an_option() {
        let (_, options) = parse("--install-option --force").unwrap();
        assert_eq!(options.install_options, vec!["--force"]);
    }

    #[test]
    fn double_dash_ends_options() {
        let (_, options) = parse("--pre -- --no-such-thing").unwrap();
        assert!(options.pre);
    }

    #[test_case("--in x", "error: ambiguous option: --in (--index-url, --install-option?)")]
    #[test_case("--req x", "error: ambiguous option: --req (--require-hashes, --requirement?)")]
    #[test_case("--foo", "error: no such option: --foo")]
    #[test_case("-x", "error: no such option: -x")]
    #[test_case("--index-url", "error: --index-url option requires 1 argument")]
    #[test_case("-r", "error: -r option requires 1 argument")]
    #[test_case("--pre=yes", "error: --pre option does not take a value")]
    #[test_case("--use-feature x", "error: option --use-feature: invalid choice: 'x' (choose from '2020-resolver', 'fast-deps', 'in-tree-build')")]
    #[test_case("--hash 'sha256:abc", "No closing quotation")]
    #[test_case("--no-binary -x", "--no-binary / --only-binary option requires 1 argument.")]
    fn errors(line: &str, expected: &str) {
        assert_eq!(parse(line).unwrap_err(), expected);
    }

    #[test]
    fn format_control_is_shared() {
        let mut format_control = FormatControl::default();
        parse_line("--no-binary :all:", &mut format_control).unwrap();
        // The line fails, but the earlier option has already been applied.
        parse_line("--only-binary foo --bogus", &mut format_control).unwrap_err();
        assert_eq!(
            format_control.only_binary.iter().collect::<Vec<_>>(),
            vec!["foo"]
        );
        assert_eq!(
            format_control.no_binary.iter().collect::<Vec<_>>(),
            vec![":all:"]
        );
    }

    #[test]
    fn features() {
        let (_, options) = parse("--use-feature fast-deps --use-feature=in-tree-build").unwrap();
        assert_eq!(options.features_enabled, vec!["fast-deps", "in-tree-build"]);
    }
}
