//! Atomic file writing and filesystem-name helpers.
//!
//! Every persisted file (accounts.json, AWS credentials/config) goes through
//! `atomic_write_str`: the previous version is copied to `<file>.bak`
//! best-effort, the new content lands in `<file>.tmp`, and the temp file is
//! renamed onto the target. A reader never observes a half-written file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Append a suffix to the final path component: `config` → `config.tmp`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Write `content` to `path` atomically.
///
/// Steps:
/// 1. Copy the existing file to `<path>.bak` (best-effort; a missing target
///    is not an error, any other backup failure is logged and skipped).
/// 2. Write the full content to `<path>.tmp` with owner-only permissions
///    (0o600) where the OS supports POSIX modes.
/// 3. Rename the temp file onto `path` (atomic on the same filesystem).
///
/// On any failure after step 1, the temp file is unlinked and the original
/// error is returned. If that cleanup unlink itself fails, the orphaned
/// `.tmp` is logged rather than silently ignored — the target file is still
/// untouched.
pub fn atomic_write_str(path: &Path, content: &str) -> io::Result<()> {
    let tmp = sibling(path, ".tmp");
    let bak = sibling(path, ".bak");

    if path.exists() {
        if let Err(e) = fs::copy(path, &bak) {
            log::warn!("Could not back up {}: {}", path.display(), e);
        }
    }

    let write = || -> io::Result<()> {
        fs::write(&tmp, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(&tmp, path)
    };

    if let Err(err) = write() {
        match fs::remove_file(&tmp) {
            Ok(()) => {}
            Err(cleanup) if cleanup.kind() == io::ErrorKind::NotFound => {}
            Err(cleanup) => {
                log::warn!(
                    "Orphaned temp file {} left behind: {}",
                    tmp.display(),
                    cleanup
                );
            }
        }
        return Err(err);
    }

    Ok(())
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
///
/// Used for logo file names derived from profile names.
pub fn sanitize_for_filesystem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_creates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.json");

        atomic_write_str(&path, "hello").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
        assert!(!sibling(&path, ".tmp").exists());
        assert!(!sibling(&path, ".bak").exists());
    }

    #[test]
    fn test_atomic_write_backs_up_previous_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.json");

        atomic_write_str(&path, "first").unwrap();
        atomic_write_str(&path, "second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(fs::read_to_string(sibling(&path, ".bak")).unwrap(), "first");
        assert!(!sibling(&path, ".tmp").exists());
    }

    #[test]
    fn test_atomic_write_missing_parent_fails_cleanly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("no-such-dir").join("data.json");

        assert!(atomic_write_str(&path, "content").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_atomic_write_failure_leaves_target_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A directory at the target path makes the final rename fail.
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("inner.txt"), "keep me").unwrap();

        assert!(atomic_write_str(&path, "new content").is_err());

        assert!(path.is_dir());
        assert_eq!(
            fs::read_to_string(path.join("inner.txt")).unwrap(),
            "keep me"
        );
        assert!(!sibling(&path, ".tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials");

        atomic_write_str(&path, "[default]\n").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_sanitize_for_filesystem() {
        assert_eq!(sanitize_for_filesystem("dev-account_1"), "dev-account_1");
        assert_eq!(sanitize_for_filesystem("my profile!"), "my_profile_");
        assert_eq!(sanitize_for_filesystem("a/b\\c"), "a_b_c");
    }
}
