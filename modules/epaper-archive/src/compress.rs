// Optional size reduction of stored artifacts.
//
// Compression never fails the pipeline: the re-encoded file replaces the
// original only when it is strictly smaller, otherwise the original stays as is.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionOutcome {
    Reduced { before: u64, after: u64 },
    NotSmaller { before: u64, after: u64 },
    Failed,
    Disabled,
}

/// Result of a compression pass: where the artifact is and how big it ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compression {
    pub path: PathBuf,
    pub outcome: CompressionOutcome,
    pub stored_bytes: u64,
}

pub trait Compressor: Send + Sync {
    fn compress(&self, path: &Path) -> Compression;
}

/// Leaves artifacts untouched.
pub struct NoCompression;

impl Compressor for NoCompression {
    fn compress(&self, path: &Path) -> Compression {
        Compression {
            path: path.to_path_buf(),
            outcome: CompressionOutcome::Disabled,
            stored_bytes: file_size(path).unwrap_or(0),
        }
    }
}

/// Re-encodes PDFs with `lopdf`: prunes unreferenced objects, drops empty
/// streams and deflates the remaining ones.
pub struct PdfCompressor;

impl Compressor for PdfCompressor {
    fn compress(&self, path: &Path) -> Compression {
        shrink_in_place(path, |src, dst| {
            let mut doc = lopdf::Document::load(src)?;
            doc.prune_objects();
            doc.delete_zero_length_streams();
            doc.compress();
            doc.save(dst)?;
            Ok(())
        })
    }
}

/// Run `encode(src, dst)` into a sibling temp file and keep its output only if
/// it is strictly smaller than the original.
pub fn shrink_in_place<F>(path: &Path, encode: F) -> Compression
where
    F: FnOnce(&Path, &Path) -> anyhow::Result<()>,
{
    let failed = |stored_bytes| Compression {
        path: path.to_path_buf(),
        outcome: CompressionOutcome::Failed,
        stored_bytes,
    };

    let before = match file_size(path) {
        Ok(size) => size,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot stat artifact, skipping compression");
            return failed(0);
        }
    };

    let tmp = {
        let mut name = path.as_os_str().to_os_string();
        name.push(".min");
        PathBuf::from(name)
    };

    let encoded = encode(path, &tmp).and_then(|()| Ok(file_size(&tmp)?));
    let after = match encoded {
        Ok(after) => after,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            warn!(path = %path.display(), error = %e, "Compression failed, keeping original");
            return failed(before);
        }
    };

    if after >= before {
        let _ = fs::remove_file(&tmp);
        info!(path = %path.display(), before, after, "Compression did not reduce size, keeping original");
        return Compression {
            path: path.to_path_buf(),
            outcome: CompressionOutcome::NotSmaller { before, after },
            stored_bytes: before,
        };
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        warn!(path = %path.display(), error = %e, "Could not replace original with compressed file");
        return failed(before);
    }

    let reduction = (before - after) as f64 / before as f64 * 100.0;
    info!(
        path = %path.display(),
        before,
        after,
        reduction = %format!("{reduction:.1}%"),
        "Compressed artifact"
    );
    Compression {
        path: path.to_path_buf(),
        outcome: CompressionOutcome::Reduced { before, after },
        stored_bytes: after,
    }
}

fn file_size(path: &Path) -> std::io::Result<u64> {
    fs::metadata(path).map(|m| m.len())
}
