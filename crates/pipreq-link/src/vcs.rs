/// Every `vcs+transport` scheme a link may use.
pub const VCS_ALL_SCHEMES: [&str; 22] = [
    "bzr+http",
    "bzr+https",
    "bzr+ssh",
    "bzr+sftp",
    "bzr+ftp",
    "bzr+lp",
    "bzr+file",
    "git+http",
    "git+https",
    "git+ssh",
    "git+git",
    "git+file",
    "hg+file",
    "hg+http",
    "hg+https",
    "hg+ssh",
    "hg+static-http",
    "svn+ssh",
    "svn+http",
    "svn+https",
    "svn+svn",
    "svn+file",
];

/// Bare schemes that are read as `{scheme}+{scheme}:` in editable requirements.
pub const VCS_BACKENDS: [&str; 6] = ["ssh", "git", "hg", "bzr", "sftp", "svn"];

/// The lowercased text before the first `:`, if any.
pub fn get_url_scheme(url: &str) -> Option<String> {
    url.split_once(':')
        .map(|(scheme, _)| scheme.to_lowercase())
}

/// Whether the name starts with a scheme of a fetchable URL.
pub fn is_url(name: &str) -> bool {
    get_url_scheme(name).is_some_and(|scheme| {
        matches!(scheme.as_str(), "http" | "https" | "file" | "ftp")
            || VCS_ALL_SCHEMES.contains(&scheme.as_str())
    })
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("https://example.com/pkg.whl", true)]
    #[test_case("FILE:///tmp/pkg", true)]
    #[test_case("git+ssh://git@github.com/pypa/pip.git", true)]
    #[test_case("hg+static-http://host/repo", true)]
    #[test_case("git://github.com/pypa/pip.git", false)]
    #[test_case("pkg>=1.0; python_version < '3.8'", false)]
    #[test_case("requests", false)]
    fn url(name: &str, expected: bool) {
        assert_eq!(is_url(name), expected);
    }
}
