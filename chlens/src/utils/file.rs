//! Filesystem path helpers

use std::io;
use std::path::{Path, PathBuf};

/// Turn a user-supplied path into an absolute one.
///
/// `~` and `~/…` resolve against the home directory; anything relative
/// resolves against the current directory. Empty input means the current
/// directory.
pub fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();

    if path.is_empty() {
        return std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    }

    let expanded = match path.strip_prefix('~') {
        Some("") => dirs::home_dir().unwrap_or_else(|| PathBuf::from(path)),
        Some(rest) if rest.starts_with('/') || rest.starts_with('\\') => dirs::home_dir()
            .map(|home| home.join(&rest[1..]))
            .unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    };

    if expanded.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    } else {
        expanded
    }
}

/// Create `dir` (and parents) if missing
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    if !dir.is_dir() {
        tracing::debug!(path = %dir.display(), "Creating output directory");
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_absolute_unchanged() {
        assert_eq!(expand_path("/var/tmp/out"), PathBuf::from("/var/tmp/out"));
    }

    #[test]
    fn test_expand_relative_is_absolute() {
        let result = expand_path("flamegraphs");
        assert!(result.is_absolute());
        assert!(result.ends_with("flamegraphs"));
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~"), home);
            assert_eq!(expand_path("~/.chlens"), home.join(".chlens"));
        }
    }

    #[test]
    fn test_expand_empty_is_cwd() {
        assert_eq!(expand_path("  "), std::env::current_dir().unwrap());
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir(&nested).unwrap();
    }
}
