use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    pub staged: PathBuf,
    pub target: PathBuf,
}

pub async fn ensure_output_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create output directory {}", path.display()))
}

// Hidden, run-unique temp path in the same directory as `target`, so the
// final rename never crosses a filesystem.
pub fn staging_path(target: &Path) -> PathBuf {
    sibling_path(target, "tmp")
}

fn backup_path(target: &Path) -> PathBuf {
    sibling_path(target, "bak")
}

fn sibling_path(target: &Path, suffix: &str) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    target
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{file_name}.{}.{suffix}", Uuid::new_v4()))
}

struct Promoted {
    target: PathBuf,
    backup: Option<PathBuf>,
}

// All or nothing: if any rename fails, every target already replaced in this
// call is restored to its previous contents (or removed if it had none).
pub async fn promote(artifacts: &[StagedArtifact]) -> Result<()> {
    let mut promoted: Vec<Promoted> = Vec::with_capacity(artifacts.len());

    for (idx, artifact) in artifacts.iter().enumerate() {
        if let Err(err) = promote_one(artifact, &mut promoted).await {
            rollback(&promoted).await;
            for pending in &artifacts[idx..] {
                if let Err(cleanup) = delete_file_if_exists(&pending.staged).await {
                    warn!("Failed to remove staged artifact: {cleanup:#}");
                }
            }
            return Err(err);
        }
    }

    for entry in &promoted {
        if let Some(backup) = &entry.backup {
            if let Err(cleanup) = delete_file_if_exists(backup).await {
                warn!("Failed to remove previous artifact: {cleanup:#}");
            }
        }
    }
    Ok(())
}

async fn promote_one(artifact: &StagedArtifact, promoted: &mut Vec<Promoted>) -> Result<()> {
    let backup = match fs::try_exists(&artifact.target).await {
        Ok(true) => {
            let backup = backup_path(&artifact.target);
            fs::rename(&artifact.target, &backup)
                .await
                .with_context(|| format!("Failed to set aside {}", artifact.target.display()))?;
            Some(backup)
        }
        _ => None,
    };

    if let Err(err) = fs::rename(&artifact.staged, &artifact.target).await {
        if let Some(backup) = &backup {
            if let Err(restore) = fs::rename(backup, &artifact.target).await {
                warn!(
                    path = %artifact.target.display(),
                    "Failed to restore previous artifact: {restore}"
                );
            }
        }
        return Err(err).with_context(|| {
            format!(
                "Failed to move {} into place at {}",
                artifact.staged.display(),
                artifact.target.display()
            )
        });
    }

    promoted.push(Promoted {
        target: artifact.target.clone(),
        backup,
    });
    Ok(())
}

async fn rollback(promoted: &[Promoted]) {
    for entry in promoted.iter().rev() {
        let result = match &entry.backup {
            Some(backup) => fs::rename(backup, &entry.target)
                .await
                .with_context(|| format!("Failed to restore {}", entry.target.display())),
            None => delete_file_if_exists(&entry.target).await,
        };
        if let Err(err) = result {
            warn!("Rollback of promoted artifact failed: {err:#}");
        }
    }
}

pub fn discard_staged(artifacts: &[StagedArtifact]) {
    for artifact in artifacts {
        match std::fs::remove_file(&artifact.staged) {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %artifact.staged.display(),
                "Failed to remove staged artifact: {err}"
            ),
        }
    }
}

pub async fn delete_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("Failed to delete {}", path.display())),
    }
}
