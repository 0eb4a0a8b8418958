use anyhow::Result;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use indoc::indoc;

use pipreq_requirements_txt::{
    InstallRequirement, ParseOptions, RequirementsFile, RequirementsTxtError,
};

fn names(requirements: &[InstallRequirement]) -> Vec<(&str, bool)> {
    requirements
        .iter()
        .map(|requirement| (requirement.name().unwrap_or_default(), requirement.is_constraint))
        .collect()
}

#[test]
fn comments_and_continuations() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let requirements_txt = temp_dir.child("requirements.txt");
    requirements_txt.write_str(indoc! {r"
        # header
        pkg==1.0  # note
        foo \
          ==1.0
        --index-url https://index.example.com/simple
    "})?;

    let file = RequirementsFile::from_file(requirements_txt.path(), false)?;

    let lines: Vec<(usize, &str)> = file
        .install_requirements
        .iter()
        .map(|requirement| {
            (
                requirement.requirement_line.line_number,
                requirement.requirement_line.line.as_str(),
            )
        })
        .collect();
    assert_eq!(lines, vec![(2, "pkg==1.0"), (3, "foo   ==1.0")]);

    let comments: Vec<(usize, &str)> = file
        .comment_lines
        .iter()
        .map(|line| (line.line_number, line.line.as_str()))
        .collect();
    assert_eq!(comments, vec![(1, "# header"), (2, "# note")]);

    assert_eq!(file.index_urls(), ["https://index.example.com/simple"]);
    assert_eq!(file.dumps(), "# header\npkg==1.0 # note\nfoo   ==1.0\n");
    Ok(())
}

#[test]
fn nested_constraint_is_decided_by_the_directive() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let requirements_txt = temp_dir.child("requirements.txt");
    requirements_txt.write_str(indoc! {"
        -r base.txt
        -c constraints.txt
        local==1.0
    "})?;
    temp_dir.child("base.txt").write_str(indoc! {"
        base-pkg
        -c more-constraints.txt
    "})?;
    temp_dir.child("more-constraints.txt").write_str("more<2\n")?;
    temp_dir.child("constraints.txt").write_str(indoc! {"
        c-pkg<2
        -r inner.txt
    "})?;
    temp_dir.child("inner.txt").write_str("inner-pkg\n")?;

    let file = RequirementsFile::from_file(requirements_txt.path(), true)?;
    assert_eq!(
        names(&file.install_requirements),
        vec![
            ("base-pkg", false),
            ("more", true),
            ("c-pkg", true),
            ("inner-pkg", false),
            ("local", false),
        ]
    );

    let inner = &file.install_requirements[3];
    assert_eq!(
        inner.requirement_line.filename,
        temp_dir.child("inner.txt").path().to_string_lossy()
    );
    Ok(())
}

#[test]
fn nested_files_are_skipped_unless_asked_for() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let requirements_txt = temp_dir.child("requirements.txt");
    requirements_txt.write_str(indoc! {"
        -r missing.txt
        -c also-missing.txt
        local==1.0
    "})?;

    let file = RequirementsFile::from_file(requirements_txt.path(), false)?;
    assert_eq!(names(&file.install_requirements), vec![("local", false)]);
    assert!(file.invalid_lines.is_empty());
    assert_eq!(file.dumps(), "local==1.0\n");
    Ok(())
}

#[test]
fn missing_nested_file_is_fatal() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let requirements_txt = temp_dir.child("requirements.txt");
    requirements_txt.write_str("pkg\n-r missing.txt\n")?;

    let err = RequirementsFile::from_file(requirements_txt.path(), true).unwrap_err();
    let RequirementsTxtError::Open { file, .. } = &err else {
        panic!("expected an open error, got {err:?}");
    };
    assert_eq!(
        file,
        &temp_dir.child("missing.txt").path().to_string_lossy()
    );
    assert!(
        err.to_string()
            .starts_with("Could not open requirements file: ")
    );
    Ok(())
}

#[test]
fn circular_include() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let a = temp_dir.child("a.txt");
    a.write_str("pkg-a\n-r b.txt\n")?;
    temp_dir.child("b.txt").write_str("-r a.txt\n")?;

    let err = RequirementsFile::from_file(a.path(), true).unwrap_err();
    let RequirementsTxtError::CircularInclude { chain, .. } = &err else {
        panic!("expected a circular include, got {err:?}");
    };
    assert_eq!(chain.len(), 2);

    let a = a.path().to_string_lossy();
    let b = temp_dir.child("b.txt").path().to_string_lossy().into_owned();
    assert_eq!(
        err.to_string(),
        format!("Requirements file {a} includes itself: {a} -> {b} -> {a}")
    );
    Ok(())
}

#[test]
fn self_include() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let requirements_txt = temp_dir.child("requirements.txt");
    requirements_txt.write_str("-r requirements.txt\n")?;

    let err = RequirementsFile::from_file(requirements_txt.path(), true).unwrap_err();
    assert!(matches!(err, RequirementsTxtError::CircularInclude { .. }));

    // Without following nested files, there is nothing to detect.
    let file = RequirementsFile::from_file(requirements_txt.path(), false)?;
    assert!(file.install_requirements.is_empty());
    Ok(())
}

#[test]
fn diamond_include_is_read_twice() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let top = temp_dir.child("top.txt");
    top.write_str("-r left.txt\n-r right.txt\n")?;
    temp_dir.child("left.txt").write_str("-r shared.txt\n")?;
    temp_dir.child("right.txt").write_str("-r shared.txt\n")?;
    temp_dir.child("shared.txt").write_str("shared==1.0\n")?;

    let file = RequirementsFile::from_file(top.path(), true)?;
    assert_eq!(
        names(&file.install_requirements),
        vec![("shared", false), ("shared", false)]
    );
    Ok(())
}

#[test]
fn utf16_bom() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let requirements_txt = temp_dir.child("requirements.txt");
    let mut data = vec![0xFF, 0xFE];
    for unit in "pkg==1.0\r\nother\r\n".encode_utf16() {
        data.extend(unit.to_le_bytes());
    }
    requirements_txt.write_binary(&data)?;

    let file = RequirementsFile::from_file(requirements_txt.path(), false)?;
    assert_eq!(
        names(&file.install_requirements),
        vec![("pkg", false), ("other", false)]
    );
    Ok(())
}

#[test]
fn coding_declaration() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let requirements_txt = temp_dir.child("requirements.txt");
    requirements_txt.write_binary(b"# -*- coding: latin-1 -*-\npkg==1.0  # caf\xe9\n")?;

    let file = RequirementsFile::from_file(requirements_txt.path(), false)?;
    assert_eq!(file.comment_lines[1].line, "# caf\u{e9}");
    Ok(())
}

#[test]
fn default_encoding() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let requirements_txt = temp_dir.child("requirements.txt");
    requirements_txt.write_binary(b"pkg==1.0  # caf\xe9\n")?;

    let err = RequirementsFile::from_file(requirements_txt.path(), false).unwrap_err();
    assert!(matches!(err, RequirementsTxtError::Decode { .. }));

    let file = RequirementsFile::from_file_with(
        requirements_txt.path(),
        &ParseOptions {
            include_nested: false,
            default_encoding: encoding_rs::WINDOWS_1252,
        },
    )?;
    assert_eq!(file.comment_lines[0].line, "# caf\u{e9}");
    Ok(())
}

#[test]
fn invalid_lines() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let requirements_txt = temp_dir.child("requirements.txt");
    requirements_txt.write_str(indoc! {"
        --foo
        pkg=1.0
        -e not-a-vcs
        good==1.0
        --hash 'sha256:abcd
    "})?;

    let file = RequirementsFile::from_file(requirements_txt.path(), false)?;
    assert_eq!(names(&file.install_requirements), vec![("good", false)]);

    let invalid: Vec<(usize, &str)> = file
        .invalid_lines
        .iter()
        .map(|line| (line.requirement_line.line_number, line.error_message.as_str()))
        .collect();
    assert_eq!(invalid.len(), 4);
    assert_eq!(invalid[0], (1, "error: no such option: --foo"));
    assert_eq!(
        invalid[1],
        (2, "Invalid requirement\nHint: = is not a valid operator. Did you mean == ?")
    );
    assert_eq!(invalid[2].0, 3);
    assert!(
        invalid[2]
            .1
            .starts_with("not-a-vcs is not a valid editable requirement.")
    );
    assert_eq!(invalid[3], (5, "No closing quotation"));

    // Invalid lines are kept in the reconstruction.
    assert_eq!(
        file.dumps(),
        "--foo\npkg=1.0\n-e not-a-vcs\ngood==1.0\n--hash 'sha256:abcd\n"
    );
    Ok(())
}

#[test]
fn build_options_disallow_binaries() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let requirements_txt = temp_dir.child("requirements.txt");
    requirements_txt.write_str(indoc! {"
        --only-binary :all:
        pkg --install-option=--prefix=/opt
    "})?;

    let file = RequirementsFile::from_file(requirements_txt.path(), false)?;
    let format_control = &file.options.format_control;
    assert_eq!(
        format_control.no_binary.iter().collect::<Vec<_>>(),
        vec![":all:"]
    );
    assert!(format_control.only_binary.is_empty());
    assert_eq!(
        file.install_requirements[0].install_options,
        vec!["--prefix=/opt"]
    );
    Ok(())
}

#[test]
fn editables_take_no_requirement_options() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let requirements_txt = temp_dir.child("requirements.txt");
    requirements_txt.write_str(
        "-e git+https://example.com/repo.git#egg=mypkg --install-option=--user\n",
    )?;

    let file = RequirementsFile::from_file(requirements_txt.path(), false)?;
    let editable = &file.install_requirements[0];
    assert!(editable.is_editable);
    assert_eq!(editable.name(), Some("mypkg"));
    assert!(editable.install_options.is_empty());
    // Only requirement lines with build options disable binaries.
    assert!(file.options.format_control.no_binary.is_empty());
    Ok(())
}

#[test]
fn to_dict() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let requirements_txt = temp_dir.child("requirements.txt");
    requirements_txt.write_str(indoc! {"
        -i https://a.example.com/simple
        --extra-index-url https://b.example.com/simple
        -f https://links.example.com
        --require-hashes
        --use-feature fast-deps
        --no-binary :all:
        --only-binary wheel-only
        pkg==1.0 --hash=sha256:abcd  # pinned
    "})?;

    let file = RequirementsFile::from_file(requirements_txt.path(), false)?;
    insta::assert_snapshot!(serde_json::to_string_pretty(&file.to_dict(false))?, @r##"
    {
      "comment_lines": [
        {
          "line": "# pinned",
          "line_number": 8
        }
      ],
      "find_links": [
        "https://links.example.com"
      ],
      "index_urls": [
        "https://a.example.com/simple",
        "https://b.example.com/simple"
      ],
      "install_requirements": [
        {
          "extras": [],
          "global_options": [],
          "hash_options": {
            "sha256": [
              "abcd"
            ]
          },
          "install_options": [],
          "is_constraint": false,
          "is_editable": false,
          "is_pinned": true,
          "link": null,
          "markers": null,
          "name": "pkg",
          "requirement_line": {
            "line": "pkg==1.0 --hash=sha256:abcd",
            "line_number": 8
          },
          "specifier": [
            "==1.0"
          ]
        }
      ],
      "invalid_lines": [],
      "options": {
        "features_enabled": [
          "fast-deps"
        ],
        "format_control": {
          "no_binary": [
            ":all:"
          ],
          "only_binary": [
            "wheel-only"
          ]
        },
        "require_hashes": true
      }
    }
    "##);

    let with_filename = file.to_dict(true);
    assert_eq!(
        with_filename["comment_lines"][0]["filename"],
        &*requirements_txt.path().to_string_lossy()
    );
    Ok(())
}

#[test]
fn every_line_is_accounted_for() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let requirements_txt = temp_dir.child("requirements.txt");
    requirements_txt.write_str(indoc! {"
        # comment
        --pre
        pkg==1.0

        pkg=1.0  # trailing
        --prefer-binary
    "})?;

    let file = RequirementsFile::from_file(requirements_txt.path(), false)?;
    assert_eq!(file.install_requirements.len(), 1);
    assert_eq!(file.invalid_lines.len(), 1);
    assert_eq!(file.comment_lines.len(), 2);
    assert!(file.finder.allow_all_prereleases);
    assert!(file.finder.prefer_binary);
    assert_eq!(
        file.dumps(),
        "# comment\npkg==1.0\npkg=1.0 # trailing\n"
    );
    Ok(())
}
