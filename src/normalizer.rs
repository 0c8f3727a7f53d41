//! Silkscreen text normalizer
//!
//! Finds every layout file under a root directory, runs the rule set over
//! each one and writes changed files back in place. Files are independent:
//! a file that cannot be read or written is recorded as failed and the
//! batch carries on.

use crate::{
    config::NormalizeConfig,
    error::{Result, ResultExt, SilkpatchError},
    progress::ProgressTracker,
    rules::{RuleOptions, RuleSet},
};
use std::{
    borrow::Cow,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// What happened to one layout file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Content changed (and was written, unless in check mode)
    Modified,
    Unchanged,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
}

/// Per-file results of a normalizer run
#[derive(Debug, Default)]
pub struct NormalizeReport {
    pub outcomes: Vec<FileOutcome>,
    pub check_only: bool,
}

impl NormalizeReport {
    pub fn modified(&self) -> Vec<&Path> {
        self.with_status(|s| matches!(s, FileStatus::Modified))
    }

    pub fn unchanged(&self) -> Vec<&Path> {
        self.with_status(|s| matches!(s, FileStatus::Unchanged))
    }

    pub fn failed(&self) -> Vec<(&Path, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                FileStatus::Failed(reason) => Some((o.path.as_path(), reason.as_str())),
                _ => None,
            })
            .collect()
    }

    fn with_status(&self, pred: impl Fn(&FileStatus) -> bool) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter(|o| pred(&o.status))
            .map(|o| o.path.as_path())
            .collect()
    }

    /// No failures, and in check mode, nothing left to change
    pub fn is_success(&self) -> bool {
        self.failed().is_empty() && !(self.check_only && !self.modified().is_empty())
    }
}

/// The normalization engine
pub struct Normalizer {
    config: NormalizeConfig,
    rule_set: RuleSet,
    progress_tracker: ProgressTracker,
}

impl Normalizer {
    /// Create a normalizer running the standard rules
    pub fn new(config: NormalizeConfig, progress_tracker: ProgressTracker) -> Self {
        let options = RuleOptions {
            test_point_prefix: config.test_point_prefix.clone(),
            rotation: config.rotation,
            ..RuleOptions::default()
        };

        Self::with_rules(config, RuleSet::standard(options), progress_tracker)
    }

    /// Create a normalizer with a custom rule set
    pub fn with_rules(
        config: NormalizeConfig,
        rule_set: RuleSet,
        progress_tracker: ProgressTracker,
    ) -> Self {
        Self {
            config,
            rule_set,
            progress_tracker,
        }
    }

    /// Normalize every layout file under the configured root
    pub fn run(&self) -> Result<NormalizeReport> {
        let start = std::time::Instant::now();
        let files = self.discover_files(&self.config.root)?;

        let progress = self
            .progress_tracker
            .create_file_progress(files.len(), "Normalizing layout files");

        let mut report = NormalizeReport {
            outcomes: Vec::with_capacity(files.len()),
            check_only: self.config.check,
        };

        for file in files {
            let status = match self.process_single_file(&file) {
                Ok(status) => status,
                Err(e) => {
                    warn!("{:#}", e);
                    FileStatus::Failed(format!("{:#}", e))
                }
            };
            debug!("{}: {:?}", file.display(), status);

            ProgressTracker::update_progress(&progress, 1, None);
            report.outcomes.push(FileOutcome { path: file, status });
        }

        ProgressTracker::finish_progress(progress, "Normalization completed");

        info!(
            "Normalized {} files in {} ms ({} modified, {} failed)",
            report.outcomes.len(),
            start.elapsed().as_millis(),
            report.modified().len(),
            report.failed().len()
        );
        Ok(report)
    }

    /// All files under `root` with the layout extension, sorted
    pub fn discover_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(SilkpatchError::RootNotFound {
                path: root.display().to_string(),
            }
            .into());
        }

        info!("Searching {} for *.{} files", root.display(), self.config.extension);

        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.has_layout_extension(path))
            .collect();
        files.sort();

        info!("Discovered {} layout files", files.len());
        Ok(files)
    }

    fn has_layout_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.config.extension))
            .unwrap_or(false)
    }

    /// Apply the rule set to one file, writing it back if it changed
    fn process_single_file(&self, path: &Path) -> Result<FileStatus> {
        let content = fs::read_to_string(path).with_path_context("read", path)?;

        let Cow::Owned(normalized) = self.rule_set.apply(&content) else {
            return Ok(FileStatus::Unchanged);
        };

        if !self.config.check {
            fs::write(path, normalized).with_path_context("write", path)?;
            info!("Rewrote {}", path.display());
        }
        Ok(FileStatus::Modified)
    }
}
