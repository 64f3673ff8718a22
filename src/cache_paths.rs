//! Purpose: Default cache-directory resolution for extracted subordinate archives.
//! Exports: `default_cache_root`, `default_cache_dir`.
//! Role: Keep the CLI's one-directory-per-primary convention in one place.
//! Invariants: Default cache root remains `~/.strata/cache`.
//! Invariants: Distinct primary file stems map to distinct cache directories.

use std::path::{Path, PathBuf};

pub(crate) fn default_cache_root() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".strata").join("cache")
}

pub(crate) fn default_cache_dir(primary: &Path) -> PathBuf {
    cache_dir_for(primary, &default_cache_root())
}

pub(crate) fn cache_dir_for(primary: &Path, root: &Path) -> PathBuf {
    let stem = primary
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "primary".to_string());
    root.join(stem)
}

#[cfg(test)]
mod tests {
    use super::cache_dir_for;
    use std::path::Path;

    #[test]
    fn cache_dir_is_keyed_by_primary_stem() {
        let root = Path::new("/cache");
        assert_eq!(
            cache_dir_for(Path::new("/srv/services/Monitor.jar"), root),
            Path::new("/cache/Monitor")
        );
        assert_eq!(cache_dir_for(Path::new("/"), root), Path::new("/cache/primary"));
    }
}
