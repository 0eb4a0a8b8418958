/// Extensions of the archives pip knows how to unpack.
pub const ARCHIVE_EXTENSIONS: [&str; 12] = [
    ".zip", ".whl", ".tar.bz2", ".tbz", ".tar.gz", ".tgz", ".tar", ".tar.xz", ".txz", ".tlz",
    ".tar.lz", ".tar.lzma",
];

/// Split a path into stem and extension, treating `.tar.*` as a single extension.
///
/// Leading dots of the final component don't start an extension, so `.bashrc` has none.
pub fn splitext(path: &str) -> (&str, &str) {
    let (base, ext) = posix_splitext(path);
    let split = base.len().saturating_sub(".tar".len());
    if base
        .get(split..)
        .is_some_and(|tail| tail.len() == 4 && tail.eq_ignore_ascii_case(".tar"))
    {
        return (&path[..split], &path[split..]);
    }
    (base, ext)
}

fn posix_splitext(path: &str) -> (&str, &str) {
    let filename_start = path.rfind('/').map_or(0, |sep| sep + 1);
    let Some(dot) = path[filename_start..].rfind('.').map(|dot| dot + filename_start) else {
        return (path, "");
    };
    if path[filename_start..dot].bytes().all(|byte| byte == b'.') {
        return (path, "");
    }
    path.split_at(dot)
}

/// Whether the name carries one of the [`ARCHIVE_EXTENSIONS`], case-insensitively.
pub fn is_archive_file(name: &str) -> bool {
    let ext = splitext(name).1.to_lowercase();
    ARCHIVE_EXTENSIONS.contains(&ext.as_str())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("foo-1.0.tar.gz", ("foo-1.0", ".tar.gz"))]
    #[test_case("foo-1.0.TAR.bz2", ("foo-1.0", ".TAR.bz2"))]
    #[test_case("dir/foo.whl", ("dir/foo", ".whl"))]
    #[test_case("dir.d/foo", ("dir.d/foo", ""))]
    #[test_case(".bashrc", (".bashrc", ""))]
    #[test_case("..tar", (".", ".tar"))]
    #[test_case("foo.tar", ("foo", ".tar"))]
    #[test_case("foo", ("foo", ""))]
    fn split(path: &str, expected: (&str, &str)) {
        assert_eq!(splitext(path), expected);
    }

    #[test_case("pkg-1.0.tar.gz", true)]
    #[test_case("pkg-1.0.ZIP", true)]
    #[test_case("pkg-1.0-py3-none-any.whl", true)]
    #[test_case("pkg-1.0.tar.lzma", true)]
    #[test_case("pkg-1.0.rar", false)]
    #[test_case("./downloads", false)]
    fn archives(name: &str, expected: bool) {
        assert_eq!(is_archive_file(name), expected);
    }
}
