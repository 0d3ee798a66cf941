//! Dataset archive acquisition: download, verify, extract.

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Subdirectories of a Medical Segmentation Decathlon task.
pub const IMAGES_TR: &str = "imagesTr";
pub const LABELS_TR: &str = "labelsTr";
pub const IMAGES_TS: &str = "imagesTs";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Download URL for a publicly shared Google Drive file.
pub fn google_drive_url(file_id: &str) -> String {
    format!("https://drive.google.com/uc?export=download&id={}&confirm=t", file_id)
}

/// A remote tar archive that unpacks into `<root>/<task>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetArchive {
    pub task: String,
    pub file_id: String,
    pub sha256: Option<String>,
    pub description: String,
}

impl DatasetArchive {
    pub fn new(task: impl Into<String>, file_id: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            file_id: file_id.into(),
            sha256: None,
            description: String::new(),
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Medical Segmentation Decathlon, task 4.
    pub fn hippocampus() -> Self {
        Self::new("Task04_Hippocampus", "1RzPB1_bqzQhlWvU-YGvZzhx2omcDh38C")
            .with_description("Hippocampus head and body on mono-modal MRI (260 train / 130 test)")
    }

    pub fn url(&self) -> String {
        google_drive_url(&self.file_id)
    }

    /// Archives known by name.
    pub fn known() -> Vec<Self> {
        vec![Self::hippocampus()]
    }

    pub fn find(task: &str) -> Option<Self> {
        Self::known().into_iter().find(|a| a.task == task)
    }
}

/// NIfTI file counts of an extracted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskSummary {
    pub images_tr: usize,
    pub labels_tr: usize,
    pub images_ts: usize,
}

/// Manages archives under a data root.
pub struct ArchiveManager {
    root: PathBuf,
}

impl ArchiveManager {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn task_dir(&self, task: &str) -> PathBuf {
        self.root.join(task)
    }

    pub fn archive_path(&self, task: &str) -> PathBuf {
        self.root.join(format!("{}.tar", task))
    }

    /// Make sure `<root>/<task>` exists, downloading and extracting the
    /// archive when it does not (or when `force` is set).
    pub fn acquire(&self, archive: &DatasetArchive, force: bool) -> Result<PathBuf> {
        let task_dir = self.task_dir(&archive.task);
        if task_dir.is_dir() && !force {
            info!(
                "Dataset {} already exists at {}. Use --force to re-download.",
                archive.task,
                task_dir.display()
            );
            return Ok(task_dir);
        }

        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create data root {}", self.root.display()))?;

        let archive_path = self.archive_path(&archive.task);
        let url = archive.url();
        info!("Downloading {} from: {}", archive.task, url);
        let digest = download_with_progress(&url, &archive_path)?;

        if let Some(expected) = &archive.sha256 {
            if !digest.eq_ignore_ascii_case(expected) {
                bail!(
                    "Hash mismatch for {}. Expected: {}, Got: {}",
                    archive_path.display(),
                    expected,
                    digest
                );
            }
            info!("Hash verified for {}", archive_path.display());
        }

        extract_archive(&archive_path, &self.root)?;
        if !task_dir.is_dir() {
            bail!(
                "Archive {} did not contain a {} directory",
                archive_path.display(),
                archive.task
            );
        }

        info!("Dataset {} extracted to {}", archive.task, task_dir.display());
        Ok(task_dir)
    }

    /// Count the NIfTI files of an extracted task.
    pub fn verify(&self, task: &str) -> Result<TaskSummary> {
        let task_dir = self.task_dir(task);
        if !task_dir.is_dir() {
            bail!("Dataset directory {} does not exist", task_dir.display());
        }

        let count = |sub: &str| -> Result<usize> {
            let dir = task_dir.join(sub);
            if dir.is_dir() {
                count_nifti_files(&dir)
            } else {
                warn!("Missing {} in {}", sub, task_dir.display());
                Ok(0)
            }
        };
        let summary = TaskSummary {
            images_tr: count(IMAGES_TR)?,
            labels_tr: count(LABELS_TR)?,
            images_ts: count(IMAGES_TS)?,
        };

        info!("Checking dataset: {}", task);
        info!("  {}: {} NIfTI files", IMAGES_TR, summary.images_tr);
        info!("  {}: {} NIfTI files", LABELS_TR, summary.labels_tr);
        info!("  {}: {} NIfTI files", IMAGES_TS, summary.images_ts);
        if summary.images_tr != summary.labels_tr {
            warn!(
                "{} has {} training images but {} labels",
                task, summary.images_tr, summary.labels_tr
            );
        }
        Ok(summary)
    }

    /// Remove the extracted task and its archive.
    pub fn clean(&self, task: &str) -> Result<()> {
        let task_dir = self.task_dir(task);
        if task_dir.exists() {
            std::fs::remove_dir_all(&task_dir)
                .with_context(|| format!("Failed to remove {}", task_dir.display()))?;
            info!("Removed {}", task_dir.display());
        }
        let archive_path = self.archive_path(task);
        if archive_path.exists() {
            std::fs::remove_file(&archive_path)
                .with_context(|| format!("Failed to remove {}", archive_path.display()))?;
            info!("Removed {}", archive_path.display());
        }
        Ok(())
    }
}

/// Stream `url` into `dest` with a progress bar; returns the hex SHA-256.
fn download_with_progress(url: &str, dest: &Path) -> Result<String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?;

    let mut response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| anyhow::anyhow!("Failed to download from {}: {}", url, e))?;

    let total_size = response.content_length().unwrap_or(0);
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("#>-"),
    );

    let file = File::create(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    let mut writer = BufWriter::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = response.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
        hasher.update(&buffer[..bytes_read]);
        pb.inc(bytes_read as u64);
    }
    writer.flush()?;

    pb.finish_with_message("Download complete");
    Ok(hex::encode(hasher.finalize()))
}

/// Unpack a tar archive, gzip-compressed or not, into `dest`.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let mut magic = [0u8; 2];
    let is_gzip = {
        let mut file = File::open(archive_path)
            .with_context(|| format!("Failed to open {}", archive_path.display()))?;
        file.read_exact(&mut magic).is_ok() && magic == GZIP_MAGIC
    };

    let reader = BufReader::new(File::open(archive_path)?);
    let unpacked = if is_gzip {
        tar::Archive::new(GzDecoder::new(reader)).unpack(dest)
    } else {
        tar::Archive::new(reader).unpack(dest)
    };
    unpacked.with_context(|| format!("Failed to extract {}", archive_path.display()))?;

    info!("Extracted {} into {}", archive_path.display(), dest.display());
    Ok(())
}

/// Whether a file name denotes a NIfTI image.
pub fn is_nifti_name(name: &str) -> bool {
    name.ends_with(".nii") || name.ends_with(".nii.gz")
}

/// Count NIfTI files below `dir`, ignoring hidden files.
pub fn count_nifti_files(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_file() && !name.starts_with('.') && is_nifti_name(&name) {
            count += 1;
        }
    }
    Ok(count)
}
