use std::str::FromStr;

use test_case::test_case;

use super::{ExtraName, PackageName, canonicalize_name, safe_extra, validate_and_normalize_ref};

#[test]
fn normalize() {
    let inputs = [
        "friendly-bard",
        "Friendly-Bard",
        "FRIENDLY-BARD",
        "friendly.bard",
        "friendly_bard",
        "friendly--bard",
        "friendly-.bard",
        "FrIeNdLy-._.-bArD",
    ];
    for input in inputs {
        assert_eq!(validate_and_normalize_ref(input).unwrap(), "friendly-bard");
        assert_eq!(
            PackageName::new(input.to_string()).unwrap().as_str(),
            "friendly-bard"
        );
    }
}

#[test]
fn unchanged() {
    let unchanged = ["friendly-bard", "1okay", "okay2"];
    for input in unchanged {
        assert_eq!(validate_and_normalize_ref(input).unwrap(), input);
    }
}

#[test]
fn failures() {
    let failures = [
        " starts-with-space",
        "-starts-with-dash",
        "ends-with-dash-",
        "ends-with-space ",
        "includes!invalid-char",
        "space in middle",
        "alpha-α",
    ];
    for input in failures {
        assert!(validate_and_normalize_ref(input).is_err());
        assert!(PackageName::from_str(input).is_err());
        assert!(ExtraName::from_str(input).is_err());
    }
}

#[test_case("Django", "django")]
#[test_case("zope.interface", "zope-interface")]
#[test_case("Foo__Bar..baz", "foo-bar-baz")]
#[test_case("-weird-", "-weird-")]
#[test_case(":all:", ":all:")]
fn canonicalize(input: &str, expected: &str) {
    assert_eq!(canonicalize_name(input), expected);
}

#[test_case("Security", "security")]
#[test_case("socks proxy", "socks_proxy")]
#[test_case("a!!b", "a_b")]
#[test_case("tests.all-of", "tests.all-of")]
fn safe(input: &str, expected: &str) {
    assert_eq!(safe_extra(input), expected);
}
