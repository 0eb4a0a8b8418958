use std::path::Path;

use anyhow::{Context, Result};

use pipreq_hash::{hash_path, HashAlgorithm};

use crate::commands::ExitStatus;

/// Print the `--hash` option that pins an archive.
pub(crate) fn hash(path: &Path, algorithm: HashAlgorithm) -> Result<ExitStatus> {
    let digest = hash_path(algorithm, path)
        .with_context(|| format!("Failed to hash archive: {}", path.display()))?;
    anstream::println!("--hash={algorithm}:{digest}");
    Ok(ExitStatus::Success)
}
