//! Parts database fetcher
//!
//! Downloads the JLCPCB parts database, published as `cache.zip` plus the
//! numbered volumes `cache.z01`, `cache.z02`, ..., all in parallel. Every
//! transfer result is collected, and the archive is only extracted when all
//! of them succeeded.

use crate::archive::{Extractor, SevenZip, ZipExtractor};
use crate::config::FetchConfig;
use crate::error::{Result, ResultExt, SilkpatchError};
use crate::progress::ProgressTracker;
use anyhow::{anyhow, Context};
use indicatif::ProgressBar;
use reqwest::blocking::Client;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://yaqwsx.github.io/jlcparts/data";
pub const DEFAULT_DEST_DIR: &str = "jlcpcb_part_database";
pub const MAIN_ARCHIVE: &str = "cache.zip";
pub const DATABASE_FILE: &str = "cache.sqlite3";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// One file to download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub url: String,
    /// Local file name, the last segment of the URL
    pub name: String,
    pub dest: PathBuf,
}

/// What to download and where
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub base_url: String,
    pub dest_dir: PathBuf,
    pub volumes: u8,
    pub max_age: Duration,
    pub force: bool,
}

impl FetchPlan {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            dest_dir: config.dest.clone(),
            volumes: config.volumes,
            max_age: Duration::from_secs(config.max_age_days.saturating_mul(SECONDS_PER_DAY)),
            force: config.force,
        }
    }

    /// Main archive first, then the numbered volumes
    pub fn file_names(&self) -> Vec<String> {
        std::iter::once(MAIN_ARCHIVE.to_string())
            .chain((1..=self.volumes).map(|i| format!("cache.z{:02}", i)))
            .collect()
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.file_names()
            .into_iter()
            .map(|name| Transfer {
                url: format!("{}/{}", self.base_url, name),
                dest: self.dest_dir.join(&name),
                name,
            })
            .collect()
    }

    pub fn archive_path(&self) -> PathBuf {
        self.dest_dir.join(MAIN_ARCHIVE)
    }

    pub fn database_path(&self) -> PathBuf {
        self.dest_dir.join(DATABASE_FILE)
    }

    /// Time since the database file was last written, if it exists
    pub fn database_age(&self) -> Option<Duration> {
        let modified = fs::metadata(self.database_path()).ok()?.modified().ok()?;
        let updated: chrono::DateTime<chrono::Local> = modified.into();
        debug!("Parts database last updated {}", updated.format("%Y-%m-%d %H:%M:%S"));

        Some(SystemTime::now().duration_since(modified).unwrap_or_default())
    }

    /// True when a download is needed
    pub fn needs_download(&self) -> bool {
        if self.force {
            return true;
        }
        match self.database_age() {
            Some(age) if age < self.max_age => false,
            Some(age) => {
                info!(
                    "Parts database is {} days old, refreshing",
                    age.as_secs() / SECONDS_PER_DAY
                );
                true
            }
            None => {
                info!("No parts database at {}", self.database_path().display());
                true
            }
        }
    }

    /// Multi-volume sets need 7-Zip; a lone archive is unpacked in process
    pub fn default_extractor(&self, seven_zip: &str) -> Box<dyn Extractor> {
        if self.volumes > 0 {
            Box::new(SevenZip::new(seven_zip))
        } else {
            Box::new(ZipExtractor)
        }
    }
}

/// An open response body
pub struct Download {
    /// Length announced by the server
    pub len: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

/// Source of downloads
pub trait Transport: Send + Sync {
    fn open(&self, url: &str) -> Result<Download>;
}

/// Blocking HTTP transport
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        // The volumes are large; only bound the connect phase
        let client = Client::builder()
            .user_agent(concat!("silkpatch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn open(&self, url: &str) -> Result<Download> {
        let response = self.client.get(url).send().with_url_context(url)?;

        if !response.status().is_success() {
            return Err(SilkpatchError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        Ok(Download {
            len: response.content_length(),
            body: Box::new(response),
        })
    }
}

/// Result of a single transfer
#[derive(Debug)]
pub struct TransferOutcome {
    pub name: String,
    pub result: std::result::Result<u64, String>,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of a fetch run
#[derive(Debug, Default)]
pub struct FetchReport {
    pub transfers: Vec<TransferOutcome>,
    /// True when the database was recent enough to skip everything
    pub skipped: bool,
    pub extracted: bool,
}

impl FetchReport {
    pub fn failed(&self) -> Vec<&TransferOutcome> {
        self.transfers.iter().filter(|t| !t.is_success()).collect()
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.transfers
            .iter()
            .filter_map(|t| t.result.as_ref().ok())
            .sum()
    }
}

/// Downloads every file of a plan in parallel and extracts the archive
pub struct Fetcher {
    plan: FetchPlan,
    transport: Box<dyn Transport>,
    extractor: Box<dyn Extractor>,
    progress_tracker: ProgressTracker,
}

impl Fetcher {
    pub fn new(
        plan: FetchPlan,
        transport: Box<dyn Transport>,
        extractor: Box<dyn Extractor>,
        progress_tracker: ProgressTracker,
    ) -> Self {
        Self {
            plan,
            transport,
            extractor,
            progress_tracker,
        }
    }

    /// Fetcher using HTTP and the extractor matching the plan
    pub fn from_config(config: &FetchConfig, progress_tracker: ProgressTracker) -> Result<Self> {
        let plan = FetchPlan::from_config(config);
        let extractor = plan.default_extractor(&config.seven_zip);
        Ok(Self::new(
            plan,
            Box::new(HttpTransport::new()?),
            extractor,
            progress_tracker,
        ))
    }

    pub fn plan(&self) -> &FetchPlan {
        &self.plan
    }

    /// Download and extract, unless the database is still fresh
    ///
    /// Fails with `SilkpatchError::DownloadsIncomplete` if any transfer
    /// failed; the archive is not touched in that case.
    pub fn run(&self) -> Result<FetchReport> {
        let start = std::time::Instant::now();

        if !self.plan.needs_download() {
            info!(
                "Parts database at {} is recent, skipping download",
                self.plan.database_path().display()
            );
            return Ok(FetchReport {
                skipped: true,
                ..FetchReport::default()
            });
        }

        fs::create_dir_all(&self.plan.dest_dir)
            .with_path_context("create destination directory", &self.plan.dest_dir)?;

        let transfers = self.plan.transfers();
        info!("Downloading {} files from {}", transfers.len(), self.plan.base_url);

        let mut report = FetchReport {
            transfers: self.download_all(&transfers),
            ..FetchReport::default()
        };

        let failed = report.failed();
        if !failed.is_empty() {
            for outcome in &failed {
                if let Err(reason) = &outcome.result {
                    error!("Download of {} failed: {}", outcome.name, reason);
                }
            }
            return Err(SilkpatchError::DownloadsIncomplete {
                failed: failed.len(),
                total: report.transfers.len(),
                files: failed.iter().map(|t| t.name.clone()).collect(),
            }
            .into());
        }

        info!(
            "Downloaded {} bytes in {} ms",
            report.bytes_downloaded(),
            start.elapsed().as_millis()
        );

        let spinner = self
            .progress_tracker
            .create_spinner(&format!("Extracting {}...", MAIN_ARCHIVE));
        match self
            .extractor
            .extract(&self.plan.archive_path(), &self.plan.dest_dir)
        {
            Ok(()) => ProgressTracker::finish_progress(spinner, "Extraction completed"),
            Err(e) => {
                ProgressTracker::finish_with_error(spinner, "Extraction failed");
                return Err(e).with_context(|| {
                    format!("Failed to extract with {}", self.extractor.name())
                });
            }
        }
        report.extracted = true;

        if !self.plan.database_path().is_file() {
            warn!(
                "Extraction finished but {} was not produced",
                self.plan.database_path().display()
            );
        }

        Ok(report)
    }

    /// Run every transfer on its own scoped thread and join them all
    fn download_all(&self, transfers: &[Transfer]) -> Vec<TransferOutcome> {
        let multi = self.progress_tracker.create_multi_progress();
        let transport = self.transport.as_ref();

        std::thread::scope(|s| {
            let handles: Vec<_> = transfers
                .iter()
                .map(|transfer| {
                    let pb = self
                        .progress_tracker
                        .create_download_progress(multi.as_ref(), &transfer.name);
                    s.spawn(move || download_one(transport, transfer, pb))
                })
                .collect();

            handles
                .into_iter()
                .zip(transfers)
                .map(|(handle, transfer)| {
                    let result = handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("download thread panicked")));
                    TransferOutcome {
                        name: transfer.name.clone(),
                        result: result.map_err(|e| format!("{:#}", e)),
                    }
                })
                .collect()
        })
    }
}

/// Stream one file into a temporary file and move it into place
fn download_one(
    transport: &dyn Transport,
    transfer: &Transfer,
    pb: Option<ProgressBar>,
) -> Result<u64> {
    debug!("GET {}", transfer.url);

    let result = (|| -> Result<u64> {
        let download = transport.open(&transfer.url)?;
        if let (Some(pb), Some(len)) = (&pb, download.len) {
            pb.set_length(len);
        }

        let dir = transfer.dest.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp =
            NamedTempFile::new_in(dir).with_path_context("create temporary", dir)?;

        let mut body: Box<dyn Read + Send> = match &pb {
            Some(pb) => Box::new(pb.wrap_read(download.body)),
            None => download.body,
        };
        let bytes = io::copy(&mut body, &mut tmp).with_url_context(&transfer.url)?;

        tmp.persist(&transfer.dest)
            .with_path_context("write downloaded", &transfer.dest)?;
        Ok(bytes)
    })();

    match &result {
        Ok(bytes) => {
            info!("Saved {} ({} bytes)", transfer.dest.display(), bytes);
            ProgressTracker::finish_progress(pb, &transfer.name);
        }
        Err(e) => {
            debug!("Transfer of {} failed: {:#}", transfer.url, e);
            ProgressTracker::finish_with_error(pb, &transfer.name);
        }
    }

    result
}
