//! `.strm` helpers
//!
//! A strm file is a one-line text file holding the location (URL or mounted
//! path) a media server should stream instead of a local file.

use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `/a/b/Show - S01E01.mkv` -> `/a/b/Show - S01E01.strm`
pub fn strm_path<P: AsRef<Path>>(media_path: P) -> PathBuf {
    media_path.as_ref().with_extension("strm")
}

/// Map a local library path onto the cloud mount by swapping prefixes
pub fn cloud_path(dest: &str, local_prefix: &str, mount_prefix: &str) -> String {
    if local_prefix.is_empty() {
        return dest.to_string();
    }
    dest.replace(local_prefix, mount_prefix)
}

/// Write `target` into `path`, creating parent directories
pub async fn write_strm<P: AsRef<Path>>(path: P, target: &str) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, target).await?;
    debug!("Wrote strm {} -> {}", path.display(), target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strm_path_replaces_extension() {
        assert_eq!(
            strm_path("/strm/series/财阀X刑警 (2024)/Season 1/财阀X刑警 - S01E12 - 第 12 集.mkv"),
            PathBuf::from("/strm/series/财阀X刑警 (2024)/Season 1/财阀X刑警 - S01E12 - 第 12 集.strm")
        );
        assert_eq!(strm_path("/a/no_ext"), PathBuf::from("/a/no_ext.strm"));
    }

    #[test]
    fn test_cloud_path() {
        assert_eq!(
            cloud_path(
                "/strm/series/Show/Season 1/Show - S01E01.mkv",
                "/strm/",
                "/CloudNAS/CloudDrive/115/emby/"
            ),
            "/CloudNAS/CloudDrive/115/emby/series/Show/Season 1/Show - S01E01.mkv"
        );
        assert_eq!(cloud_path("/x/y.mkv", "", "/cloud/"), "/x/y.mkv");
    }

    #[tokio::test]
    async fn test_write_strm_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-4").join("Frieren - 05.strm");

        write_strm(&path, "https://resources.ani.rip/2024-4/x.mp4?d=true")
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "https://resources.ani.rip/2024-4/x.mp4?d=true");
    }
}
