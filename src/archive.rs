//! Archive extraction for the downloaded parts database
//!
//! Single-file ZIP archives are unpacked in process. The parts database is
//! published as a multi-volume ZIP set, which the `zip` crate cannot read, so
//! that case is handed to an external 7-Zip executable.

use crate::error::{Result, ResultExt, SilkpatchError};
use std::fs;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Unpacks an archive into a directory
pub trait Extractor: Send + Sync {
    /// Short name used in log and error messages
    fn name(&self) -> &str;

    fn extract(&self, archive: &Path, target_dir: &Path) -> Result<()>;
}

fn ensure_exists(archive: &Path) -> Result<()> {
    if !archive.is_file() {
        return Err(SilkpatchError::ArchiveMissing {
            path: archive.display().to_string(),
        }
        .into());
    }
    Ok(())
}

/// Extracts through an external `7z` executable
#[derive(Debug, Clone)]
pub struct SevenZip {
    program: String,
}

impl SevenZip {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Extractor for SevenZip {
    fn name(&self) -> &str {
        &self.program
    }

    fn extract(&self, archive: &Path, target_dir: &Path) -> Result<()> {
        ensure_exists(archive)?;

        info!(
            "Running {} on {} into {}",
            self.program,
            archive.display(),
            target_dir.display()
        );

        // 7z finds the numbered volumes next to the main archive on its own
        let output = Command::new(&self.program)
            .arg("x")
            .arg("-y")
            .arg(format!("-o{}", target_dir.display()))
            .arg(archive)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| SilkpatchError::ExtractionFailed {
                program: self.program.clone(),
                reason: format!("could not start: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SilkpatchError::ExtractionFailed {
                program: self.program.clone(),
                reason: format!("{} {}", output.status, stderr.trim()),
            }
            .into());
        }

        debug!("{} output: {}", self.program, String::from_utf8_lossy(&output.stdout));
        Ok(())
    }
}

/// Extracts single-file ZIP archives with the `zip` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn name(&self) -> &str {
        "zip"
    }

    fn extract(&self, archive: &Path, target_dir: &Path) -> Result<()> {
        ensure_exists(archive)?;

        let file = fs::File::open(archive).with_path_context("open ZIP file", archive)?;
        let mut zip = ZipArchive::new(file).map_err(|e| SilkpatchError::InvalidArchive {
            reason: format!("{}: {}", archive.display(), e),
        })?;

        info!("Extracting {} entries from {}", zip.len(), archive.display());

        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|e| SilkpatchError::InvalidArchive {
                    reason: format!("Failed to read entry {}: {}", i, e),
                })?;

            let Some(relative) = entry.enclosed_name() else {
                warn!("Skipping entry with unsafe path: {}", entry.name());
                continue;
            };
            let outpath = target_dir.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&outpath).with_path_context("create directory", &outpath)?;
                continue;
            }

            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent).with_path_context("create parent directory", parent)?;
            }

            let mut outfile =
                fs::File::create(&outpath).with_path_context("create output file", &outpath)?;
            io::copy(&mut entry, &mut outfile).with_path_context("write extracted file", &outpath)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = fs::File::create(path).expect("create zip");
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);

        for (name, content) in entries {
            zip.start_file(*name, options).expect("start entry");
            zip.write_all(content.as_bytes()).expect("write entry");
        }
        zip.finish().expect("finish zip");
    }

    #[test]
    fn test_zip_extractor_unpacks_nested_entries() {
        let dir = TempDir::new().expect("temp dir");
        let archive = dir.path().join("cache.zip");
        write_zip(
            &archive,
            &[("cache.sqlite3", "SQLite format 3"), ("meta/info.txt", "v1")],
        );

        ZipExtractor
            .extract(&archive, dir.path())
            .expect("extraction succeeds");

        assert_eq!(
            fs::read_to_string(dir.path().join("cache.sqlite3")).expect("db extracted"),
            "SQLite format 3"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("meta/info.txt")).expect("nested extracted"),
            "v1"
        );
    }

    #[test]
    fn test_missing_archive_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let err = ZipExtractor
            .extract(&dir.path().join("absent.zip"), dir.path())
            .expect_err("missing archive");

        assert!(matches!(
            err.downcast_ref::<SilkpatchError>(),
            Some(SilkpatchError::ArchiveMissing { .. })
        ));
    }

    #[test]
    fn test_corrupt_archive_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let archive = dir.path().join("cache.zip");
        fs::write(&archive, "not a zip").expect("write junk");

        let err = ZipExtractor
            .extract(&archive, dir.path())
            .expect_err("junk archive");
        assert!(matches!(
            err.downcast_ref::<SilkpatchError>(),
            Some(SilkpatchError::InvalidArchive { .. })
        ));
    }

    #[test]
    fn test_seven_zip_missing_program() {
        let dir = TempDir::new().expect("temp dir");
        let archive = dir.path().join("cache.zip");
        write_zip(&archive, &[("a.txt", "a")]);

        let err = SevenZip::new("silkpatch-no-such-7z")
            .extract(&archive, dir.path())
            .expect_err("program does not exist");
        assert!(matches!(
            err.downcast_ref::<SilkpatchError>(),
            Some(SilkpatchError::ExtractionFailed { .. })
        ));
    }
}
