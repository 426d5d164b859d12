use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use common::error::AppError;
use serde::Serialize;
use tracing::{info, warn};

/// Storage files of a LightRAG working directory that can be carried into a
/// graph.
pub const MIGRATABLE_FILES: [&str; 8] = [
    "graph_chunk_entity_relation.graphml",
    "kv_store_doc_status.json",
    "kv_store_full_docs.json",
    "kv_store_llm_response_cache.json",
    "kv_store_text_chunks.json",
    "vdb_chunks.json",
    "vdb_entities.json",
    "vdb_relationships.json",
];

const BACKUP_SUFFIX: &str = ".backup";

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MigrationReport {
    pub graph_id: String,
    pub migrated_files: Vec<String>,
    pub skipped_files: Vec<String>,
    pub entity_count: u64,
    pub relation_count: u64,
    pub document_count: u64,
}

/// Files touched by [`copy_storage_files`], enough to undo the copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageCopy {
    pub migrated: Vec<String>,
    pub skipped: Vec<String>,
    /// Migrated files whose previous version was saved as `<name>.backup`.
    pub backed_up: Vec<String>,
}

/// Copy the known storage files from `source` into `target`.
///
/// An existing target file is first copied to `<name>.backup`. A failed copy
/// is undone before the error is returned.
pub async fn copy_storage_files(source: &Path, target: &Path) -> Result<StorageCopy, AppError> {
    let is_dir = tokio::fs::metadata(source)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(AppError::NotFound(format!(
            "Source directory '{}' not found",
            source.display()
        )));
    }

    tokio::fs::create_dir_all(target).await?;
    if tokio::fs::canonicalize(source).await? == tokio::fs::canonicalize(target).await? {
        return Err(AppError::Validation(
            "Source directory is the graph's own working directory".to_string(),
        ));
    }

    let mut copy = StorageCopy::default();
    for file_name in MIGRATABLE_FILES {
        if let Err(err) = copy_one(source, target, file_name, &mut copy).await {
            if let Err(restore_err) = restore_storage_files(target, &copy).await {
                warn!(error = %restore_err, "Failed to undo partial migration");
            }
            return Err(err);
        }
    }

    Ok(copy)
}

async fn copy_one(
    source: &Path,
    target: &Path,
    file_name: &str,
    copy: &mut StorageCopy,
) -> Result<(), AppError> {
    let source_file = source.join(file_name);
    if !tokio::fs::try_exists(&source_file).await? {
        copy.skipped.push(file_name.to_string());
        return Ok(());
    }

    let target_file = target.join(file_name);
    if tokio::fs::try_exists(&target_file).await? {
        let backup = backup_path(target, file_name);
        tokio::fs::copy(&target_file, &backup).await?;
        copy.backed_up.push(file_name.to_string());
        info!(file = %file_name, backup = %backup.display(), "Backed up existing file");
    }

    // Recorded before the copy so a torn target is cleaned up on restore.
    copy.migrated.push(file_name.to_string());
    tokio::fs::copy(&source_file, &target_file).await?;
    Ok(())
}

/// Put `target` back the way it was before `copy`: backed-up files are moved
/// back into place, files that had no previous version are removed.
pub async fn restore_storage_files(target: &Path, copy: &StorageCopy) -> Result<(), AppError> {
    for file_name in &copy.migrated {
        let target_file = target.join(file_name);
        if copy.backed_up.contains(file_name) {
            tokio::fs::rename(backup_path(target, file_name), &target_file).await?;
        } else {
            match tokio::fs::remove_file(&target_file).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    info!(
        target = %target.display(),
        restored = copy.migrated.len(),
        "Restored working directory after failed migration"
    );
    Ok(())
}

fn backup_path(target: &Path, file_name: &str) -> PathBuf {
    target.join(format!("{file_name}{BACKUP_SUFFIX}"))
}
