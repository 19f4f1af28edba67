//! ZIP 压缩器（deflate）

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{Bundle, Compressor};

#[derive(Debug, Default, Clone, Copy)]
pub struct ZipCompressor;

impl ZipCompressor {
    pub fn new() -> Self {
        Self
    }
}

impl Compressor for ZipCompressor {
    /// 失败时删除写了一半的 `dest`
    fn bundle(&self, paths: &[PathBuf], dest: &Path) -> io::Result<Bundle> {
        write_bundle(paths, dest).inspect_err(|e| {
            match fs::remove_file(dest) {
                Ok(()) => tracing::debug!(dest = %dest.display(), error = %e, "partial archive removed"),
                Err(rm) if rm.kind() == io::ErrorKind::NotFound => {}
                Err(rm) => tracing::warn!(dest = %dest.display(), error = %rm, "cannot remove partial archive"),
            }
        })
    }

    fn extension(&self) -> &'static str {
        "zip"
    }
}

fn write_bundle(paths: &[PathBuf], dest: &Path) -> io::Result<Bundle> {
    let mut writer = ZipWriter::new(File::create(dest)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut included = Vec::with_capacity(paths.len());
    for path in paths {
        let mut source = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "source vanished before bundling, skipped");
                continue;
            }
            Err(e) => return Err(e),
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        writer.start_file(name, options)?;
        io::copy(&mut source, &mut writer)?;
        included.push(path.clone());
    }

    let file = writer.finish()?;
    file.sync_all()?;
    drop(file);

    Ok(Bundle {
        size_bytes: fs::metadata(dest)?.len(),
        included,
    })
}
