use crate::adapters::metadata::{BagMetadata, SQLITE3_STORAGE_ID};
use crate::utils::error::{BagFilterError, Result};
use std::path::{Path, PathBuf};

pub const DB3_EXTENSION: &str = "db3";

/// Where the storage files of an input bag live, in reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct BagLocation {
    pub bag_dir: PathBuf,
    pub storage_files: Vec<PathBuf>,
    pub metadata: Option<BagMetadata>,
}

/// Accepts either a bag directory or a single `.db3` file.
pub fn locate_bag(input: &Path) -> Result<BagLocation> {
    if !input.exists() {
        return Err(BagFilterError::BagNotFound {
            path: input.display().to_string(),
        });
    }

    if input.is_file() {
        if !has_db3_extension(input) {
            return Err(BagFilterError::NoDatabaseFile {
                path: input.display().to_string(),
            });
        }
        let bag_dir = input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        return Ok(BagLocation {
            bag_dir,
            storage_files: vec![input.to_path_buf()],
            metadata: None,
        });
    }

    let metadata = BagMetadata::read_from_dir(input)?;
    let mut storage_files = Vec::new();

    if let Some(metadata) = &metadata {
        check_storage(metadata)?;
        storage_files = files_from_metadata(input, metadata)?;
    }

    if storage_files.is_empty() {
        storage_files = scan_db3_files(input)?;
    }

    if storage_files.is_empty() {
        return Err(BagFilterError::NoDatabaseFile {
            path: input.display().to_string(),
        });
    }

    tracing::debug!(
        "Located {} storage file(s) in {}",
        storage_files.len(),
        input.display()
    );

    Ok(BagLocation {
        bag_dir: input.to_path_buf(),
        storage_files,
        metadata,
    })
}

fn check_storage(metadata: &BagMetadata) -> Result<()> {
    if !metadata.storage_identifier.is_empty() && metadata.storage_identifier != SQLITE3_STORAGE_ID
    {
        return Err(BagFilterError::UnsupportedStorage {
            identifier: metadata.storage_identifier.clone(),
        });
    }
    if !metadata.compression_mode.is_empty() {
        return Err(BagFilterError::UnsupportedStorage {
            identifier: format!(
                "{}+{} ({})",
                SQLITE3_STORAGE_ID, metadata.compression_format, metadata.compression_mode
            ),
        });
    }
    Ok(())
}

fn files_from_metadata(bag_dir: &Path, metadata: &BagMetadata) -> Result<Vec<PathBuf>> {
    metadata
        .relative_file_paths
        .iter()
        .map(|relative| {
            let direct = bag_dir.join(relative);
            if direct.is_file() {
                return Ok(direct);
            }
            // 舊版 (foxy) 會把 bag 目錄名稱也寫進相對路徑
            Path::new(relative)
                .file_name()
                .map(|name| bag_dir.join(name))
                .filter(|p| p.is_file())
                .ok_or_else(|| BagFilterError::BagNotFound {
                    path: direct.display().to_string(),
                })
        })
        .collect()
}

fn scan_db3_files(bag_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(bag_dir)? {
        let path = entry?.path();
        if path.is_file() && has_db3_extension(&path) {
            files.push(path);
        }
    }
    files.sort_by_key(|p| (split_index(p), p.clone()));
    Ok(files)
}

fn has_db3_extension(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(DB3_EXTENSION)
}

/// Split bags are named `<name>_<N>.db3`.
pub fn split_index(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let (_, index) = stem.rsplit_once('_')?;
    index.parse().ok()
}
