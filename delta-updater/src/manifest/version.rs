//! Plain-text version marker stored in the installation root.

use std::io;
use std::path::Path;
use tracing::{info, warn};

/// Version reported when no marker exists
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Default marker file name
pub const VERSION_FILE_NAME: &str = "version.txt";

/// Read the installed version, falling back to [`DEFAULT_VERSION`] when the
/// marker is missing, unreadable or empty.
pub fn read_version_marker(root: &Path, file_name: &str) -> String {
    let path = root.join(file_name);

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let version = content.trim_start_matches('\u{feff}').trim();
            if version.is_empty() {
                DEFAULT_VERSION.to_string()
            } else {
                version.to_string()
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => DEFAULT_VERSION.to_string(),
        Err(e) => {
            warn!("Failed to read version marker {}: {}", path.display(), e);
            DEFAULT_VERSION.to_string()
        }
    }
}

/// Overwrite the marker with `version`, creating the root if needed.
pub async fn write_version_marker(root: &Path, file_name: &str, version: &str) -> io::Result<()> {
    tokio::fs::create_dir_all(root).await?;
    let path = root.join(file_name);
    tokio::fs::write(&path, version.trim()).await?;
    info!("Version marker {} set to {}", path.display(), version.trim());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_marker_uses_default() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(read_version_marker(temp_dir.path(), VERSION_FILE_NAME), "1.0.0");
    }

    #[test]
    fn test_marker_is_trimmed() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        std::fs::write(temp_dir.path().join(VERSION_FILE_NAME), "\u{feff} 2.4.1\r\n")?;
        assert_eq!(read_version_marker(temp_dir.path(), VERSION_FILE_NAME), "2.4.1");
        Ok(())
    }

    #[test]
    fn test_empty_marker_uses_default() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        std::fs::write(temp_dir.path().join(VERSION_FILE_NAME), "   ")?;
        assert_eq!(read_version_marker(temp_dir.path(), VERSION_FILE_NAME), DEFAULT_VERSION);
        Ok(())
    }

    #[tokio::test]
    async fn test_write_then_read() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("fresh-install");

        write_version_marker(&root, VERSION_FILE_NAME, "3.0.0").await?;
        assert_eq!(read_version_marker(&root, VERSION_FILE_NAME), "3.0.0");
        Ok(())
    }
}
