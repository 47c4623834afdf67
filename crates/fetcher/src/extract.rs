//! Archive detection and extraction.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::error::{FetchError, Result};

/// Archive formats that are unpacked after download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    /// Detect the archive kind from the file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => ".zip",
            Self::Tar => ".tar",
            Self::TarGz => ".tar.gz",
        }
    }
}

/// Where an archive's contents go.
///
/// With `subfolder` this is a directory named after the archive (without its
/// archive extension) next to it, otherwise the archive's own directory.
pub fn extraction_target(archive: &Path, kind: ArchiveKind, subfolder: bool) -> PathBuf {
    let parent = archive
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    if !subfolder {
        return parent;
    }
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let stem = name.strip_suffix(kind.extension()).unwrap_or(name);
    parent.join(stem)
}

/// Extract `archive` into `target`, creating `target` when missing.
pub fn extract_archive(archive: &Path, kind: ArchiveKind, target: &Path) -> Result<()> {
    fs::create_dir_all(target)?;
    info!(
        archive = %archive.display(),
        target = %target.display(),
        "Extracting files"
    );

    let file = File::open(archive)?;
    let reader = BufReader::new(file);

    match kind {
        ArchiveKind::Zip => {
            let mut zip = zip::ZipArchive::new(reader)
                .map_err(|e| FetchError::extract(archive, e))?;
            debug!(entries = zip.len(), "Unpacking zip archive");
            zip.extract(target)
                .map_err(|e| FetchError::extract(archive, e))?;
        }
        ArchiveKind::Tar => {
            tar::Archive::new(reader)
                .unpack(target)
                .map_err(|e| FetchError::extract(archive, e))?;
        }
        ArchiveKind::TarGz => {
            tar::Archive::new(GzDecoder::new(reader))
                .unpack(target)
                .map_err(|e| FetchError::extract(archive, e))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_kind_detection() {
        assert_eq!(ArchiveKind::from_path(Path::new("a/b.zip")), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::from_path(Path::new("b.tar")), Some(ArchiveKind::Tar));
        assert_eq!(
            ArchiveKind::from_path(Path::new("b.tar.gz")),
            Some(ArchiveKind::TarGz)
        );
        assert_eq!(ArchiveKind::from_path(Path::new("b.tgz")), None);
        assert_eq!(ArchiveKind::from_path(Path::new("b.gz")), None);
        assert_eq!(ArchiveKind::from_path(Path::new("b.tif")), None);
    }

    #[test]
    fn test_extraction_target() {
        let archive = Path::new("/data/in/set.tar.gz");
        assert_eq!(
            extraction_target(archive, ArchiveKind::TarGz, false),
            PathBuf::from("/data/in")
        );
        assert_eq!(
            extraction_target(archive, ArchiveKind::TarGz, true),
            PathBuf::from("/data/in/set")
        );
        assert_eq!(
            extraction_target(Path::new("/data/set.zip"), ArchiveKind::Zip, true),
            PathBuf::from("/data/set")
        );
    }
}
