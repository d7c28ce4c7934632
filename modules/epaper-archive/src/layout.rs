// Archive layout: <root>/<MMMYY>/<code>-<DD-MM>.pdf

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use epaper_common::{EditionDate, Publication};

use crate::error::{ArchiveError, Result};

const ARTIFACT_EXTENSION: &str = "pdf";
const PARTIAL_SUFFIX: &str = "part";

#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn month_dir(&self, date: EditionDate) -> PathBuf {
        self.root.join(date.month().to_string())
    }

    pub fn artifact_path(&self, publication: &Publication, date: EditionDate) -> PathBuf {
        self.month_dir(date).join(format!(
            "{}-{}.{ARTIFACT_EXTENSION}",
            publication.file_code(),
            date.token()
        ))
    }

    /// Where an in-flight download is written before it is validated.
    pub fn partial_path(&self, publication: &Publication, date: EditionDate) -> PathBuf {
        let mut path = self.artifact_path(publication, date).into_os_string();
        path.push(format!(".{PARTIAL_SUFFIX}"));
        PathBuf::from(path)
    }

    pub fn prepare_month_dir(&self, date: EditionDate) -> Result<PathBuf> {
        let dir = self.month_dir(date);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Public URL of an archived artifact: `<base>/<root folder name>/<MMMYY>/<file>`.
    /// Only the path below the archive root is published, so an absolute root
    /// never leaks into the URL.
    pub fn download_reference(&self, public_base: &str, artifact: &Path) -> String {
        let relative = artifact
            .strip_prefix(&self.root)
            .unwrap_or_else(|_| Path::new(artifact.file_name().unwrap_or_default()));

        let segments: Vec<String> = self
            .root
            .file_name()
            .into_iter()
            .chain(relative.components().filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            }))
            .map(|part| part.to_string_lossy().into_owned())
            .collect();
        format!("{}/{}", public_base.trim_end_matches('/'), segments.join("/"))
    }

    /// Startup check: the root exists (or can be created) and accepts writes.
    pub fn ensure_writable(&self) -> Result<()> {
        let unwritable = |source: std::io::Error| ArchiveError::Unwritable {
            path: self.root.clone(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(unwritable)?;
        let marker = self.root.join(".write-check");
        fs::write(&marker, b"ok").map_err(unwritable)?;
        fs::remove_file(&marker).map_err(unwritable)?;
        debug!(root = %self.root.display(), "Archive root is writable");
        Ok(())
    }
}
