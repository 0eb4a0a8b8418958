use std::io::Write;

use anyhow::Result;
use test_case::test_case;

use crate::{
    hash_file, hash_path, HashAlgorithm, HashError, Hasher, Hashes, MissingHashes,
};

const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

/// Build from `(algorithm, digest)` pairs, one pair per `--hash` option.
fn hashes(pairs: &[(&str, &str)]) -> Hashes {
    Hashes::new(
        pairs
            .iter()
            .map(|(algorithm, digest)| (*algorithm, vec![(*digest).to_string()])),
    )
}

#[test]
fn order_independent_equality() {
    let first = hashes(&[("sha256", "d1"), ("sha256", "d2")]);
    let second = hashes(&[("sha256", "d2"), ("sha256", "d1")]);
    assert_eq!(first, second);
    assert_eq!(first.digest_count(), 2);
    assert_eq!(first.allowed()["sha256"], vec!["d1", "d2"]);
}

#[test_case("sha256", "d1", true)]
#[test_case("sha256", "d3", false)]
#[test_case("sha384", "d1", false)]
fn is_hash_allowed(algorithm: &str, digest: &str, expected: bool) {
    let allowed = hashes(&[("sha256", "d1"), ("sha256", "d2")]);
    assert_eq!(allowed.is_hash_allowed(algorithm, digest), expected);
}

#[test]
fn intersection() {
    let empty = Hashes::default();
    let some = hashes(&[("sha256", "a"), ("sha256", "b"), ("sha512", "c")]);
    let other = hashes(&[("sha256", "b"), ("sha256", "c"), ("md5", "d")]);

    assert_eq!(&empty & &some, some);
    assert_eq!(&some & &empty, some);
    assert_eq!(&some & &other, hashes(&[("sha256", "b")]));
}

#[test]
fn check_against_chunks_any_algorithm() -> Result<()> {
    let allowed = hashes(&[("sha256", "0000"), ("md5", HELLO_MD5)]);
    allowed.check_against_chunks([b"hel".as_slice(), b"lo".as_slice()])?;
    Ok(())
}

#[test]
fn check_against_file() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(b"hello")?;
    file.flush()?;

    hashes(&[("sha256", HELLO_SHA256)]).check_against_path(file.path())?;
    Ok(())
}

#[test]
fn digest_of_file() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(b"hello")?;
    file.flush()?;

    assert_eq!(hash_path(HashAlgorithm::Sha256, file.path())?, HELLO_SHA256);
    assert_eq!(hash_path(HashAlgorithm::Md5, file.path())?, HELLO_MD5);
    // Spans several chunks.
    let large = vec![b'a'; 20 * 1024];
    let mut hasher = Hasher::from(HashAlgorithm::Sha256);
    hasher.update(&large);
    assert_eq!(
        hash_file(HashAlgorithm::Sha256, large.as_slice())?,
        hasher.finalize()
    );
    assert!(matches!(
        hash_path(HashAlgorithm::Sha256, file.path().with_extension("missing")),
        Err(HashError::Io(_))
    ));
    Ok(())
}

#[test]
fn mismatch() {
    let allowed = hashes(&[("sha256", "bbbb"), ("sha256", "aaaa")]);
    let err = allowed.check_against_chunks([b"hello"]).unwrap_err();
    let HashError::Mismatch { gots, .. } = &err else {
        panic!("expected a mismatch, got {err:?}");
    };
    assert_eq!(gots["sha256"], HELLO_SHA256);
    insta::assert_snapshot!(err, @r"
    Hashes do not match the archive:
        Expected sha256 aaaa
              or sha256 bbbb
             Got sha256 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824
    ");
}

#[test]
fn unknown_algorithm() {
    let err = hashes(&[("whirlpool", "aaaa")])
        .check_against_chunks([b"hello"])
        .unwrap_err();
    assert_eq!(err.to_string(), "Unknown hash name: whirlpool");
}

#[test]
fn missing_reports_favorite_hash() {
    let err = MissingHashes.check_against_chunks([b"hello"]).unwrap_err();
    let HashError::Missing(digest) = err else {
        panic!("expected missing hashes, got {err:?}");
    };
    assert_eq!(digest, HELLO_SHA256);
}
