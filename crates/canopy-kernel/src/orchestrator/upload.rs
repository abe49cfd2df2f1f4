//! Batch uploads into a workspace folder.
//!
//! Files are processed one at a time. Each name conflict goes to the
//! [`Confirmer`]; a declined replace skips that file and the batch
//! continues. Per-file failures are collected into the [`UploadReport`]
//! instead of aborting the batch. The workspace is re-listed once, after
//! the last file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Orchestrator, Prompt, Target, Variant};
use crate::flows::FsFlow;
use crate::path_tree::validate_name;
use crate::vfs::{VfsError, VfsErrorKind, VfsResult};
use canopy_types::NodeKind;

/// Where an upload's bytes come from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Bytes(Vec<u8>),
    /// Read lazily, only once the file is known to be written.
    Disk(PathBuf),
}

impl UploadSource {
    async fn into_bytes(self) -> VfsResult<Vec<u8>> {
        match self {
            UploadSource::Bytes(bytes) => Ok(bytes),
            UploadSource::Disk(path) => tokio::fs::read(&path)
                .await
                .map_err(|e| VfsError::from_io(e, &path)),
        }
    }
}

/// One file of a batch.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    /// Slash-separated path inside a dropped folder, e.g. `assets/img/a.png`.
    /// Only folder uploads look at it.
    pub relative_path: Option<String>,
    pub source: UploadSource,
}

impl UploadFile {
    pub fn bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            relative_path: None,
            source: UploadSource::Bytes(data.into()),
        }
    }

    /// A file on the host disk, named after its last component.
    pub fn disk(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            relative_path: None,
            source: UploadSource::Disk(path),
        }
    }

    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = Some(relative_path.into());
        self
    }
}

/// A file that could not be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadError {
    pub name: String,
    pub kind: VfsErrorKind,
    pub message: String,
}

/// Tally of a finished (or cancelled) batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Files written to a previously free name.
    pub success: usize,
    pub failed: usize,
    /// Files written over an existing node after confirmation.
    pub replaced: usize,
    /// Conflicts the user declined.
    pub skipped: usize,
    pub cancelled: bool,
    pub errors: Vec<UploadError>,
}

impl UploadReport {
    /// Files that ended up written.
    pub fn written(&self) -> usize {
        self.success + self.replaced
    }

    fn record(&mut self, name: &str, result: VfsResult<FileResult>) {
        match result {
            Ok(FileResult::Written) => self.success += 1,
            Ok(FileResult::Replaced) => self.replaced += 1,
            Ok(FileResult::Skipped) => self.skipped += 1,
            Err(e) => {
                warn!(file = %name, error = %e, "upload failed");
                self.failed += 1;
                self.errors.push(UploadError {
                    name: name.to_string(),
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Answers replace prompts during a batch.
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// True to go ahead.
    async fn confirm(&self, prompt: &Prompt) -> bool;
}

/// Replace everything without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

#[async_trait]
impl Confirmer for AlwaysConfirm {
    async fn confirm(&self, _prompt: &Prompt) -> bool {
        true
    }
}

/// Never replace; conflicting files are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverConfirm;

#[async_trait]
impl Confirmer for NeverConfirm {
    async fn confirm(&self, _prompt: &Prompt) -> bool {
        false
    }
}

enum FileResult {
    Written,
    Replaced,
    Skipped,
}

impl Orchestrator {
    /// Upload loose files into `target_folder`.
    ///
    /// Fails up front only if the folder itself is unusable (read-only,
    /// disconnected, missing); everything after that lands in the report.
    pub async fn upload_batch(
        &mut self,
        files: Vec<UploadFile>,
        target_folder: &str,
        confirm: &dyn Confirmer,
    ) -> VfsResult<UploadReport> {
        let folder = self.writable(target_folder)?;
        self.require_folder(&folder, "upload").await?;

        let mut report = UploadReport::default();
        for file in files {
            let UploadFile { name, source, .. } = file;
            let result = match validate_name(&name) {
                Ok(()) => {
                    self.upload_one(&folder, Path::new(&name), source, confirm)
                        .await
                }
                Err(e) => Err(e),
            };
            report.record(&name, result);
        }

        self.finish_upload(&folder, &report).await;
        Ok(report)
    }

    /// Upload a dropped folder, recreating its directory structure under
    /// `target_folder`.
    ///
    /// `cancel` is checked before and after every file; whatever was
    /// written by then stays and the report comes back with `cancelled`.
    pub async fn upload_folder_batch(
        &mut self,
        files: Vec<UploadFile>,
        target_folder: &str,
        confirm: &dyn Confirmer,
        cancel: &CancellationToken,
    ) -> VfsResult<UploadReport> {
        let folder = self.writable(target_folder)?;
        self.require_folder(&folder, "upload").await?;

        let mut report = UploadReport::default();
        let mut created: HashSet<PathBuf> = HashSet::new();
        for file in files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let UploadFile {
                name,
                relative_path,
                source,
            } = file;
            let relative = relative_path.unwrap_or_else(|| name.clone());
            let result = self
                .upload_nested(&folder, &relative, source, confirm, &mut created)
                .await;
            report.record(&relative, result);

            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            tokio::task::yield_now().await;
        }

        if report.cancelled {
            info!(target = %folder.path, written = report.written(), "folder upload cancelled");
        }
        self.finish_upload(&folder, &report).await;
        Ok(report)
    }

    async fn upload_nested(
        &mut self,
        folder: &Target,
        relative: &str,
        source: UploadSource,
        confirm: &dyn Confirmer,
        created: &mut HashSet<PathBuf>,
    ) -> VfsResult<FileResult> {
        let parts = split_relative(relative)?;
        let Some((file_name, dirs)) = parts.split_last() else {
            return Err(VfsError::invalid_path(relative.to_string()));
        };
        let dir = self.ensure_dirs(folder, dirs, created).await?;
        self.upload_one(folder, &dir.join(file_name), source, confirm)
            .await
    }

    /// Write one file at `relative` (below `folder`), asking before
    /// replacing.
    async fn upload_one(
        &mut self,
        folder: &Target,
        relative: &Path,
        source: UploadSource,
        confirm: &dyn Confirmer,
    ) -> VfsResult<FileResult> {
        // Looked up per file so a mid-batch disconnect fails the rest.
        let backend = self.backend_of(&folder.mount)?;
        let dest = folder.relative.join(relative);

        let stat = backend.stat(&dest).await;
        let replacing = match self.guard(&folder.mount, "upload", stat)? {
            None => false,
            Some(kind) => {
                let name = relative
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let prompt = Prompt::new(
                    "Replace File",
                    format!("\"{name}\" already exists. Replace it?"),
                    Variant::Danger,
                    "Replace",
                );
                if !confirm.confirm(&prompt).await {
                    debug!(file = %name, "replace declined");
                    return Ok(FileResult::Skipped);
                }
                if kind == NodeKind::Folder {
                    let result = backend.delete(&dest).await;
                    self.guard(&folder.mount, "upload", result)?;
                }
                true
            }
        };

        let data = source.into_bytes().await?;
        let result = backend.write(&dest, &data).await;
        self.guard(&folder.mount, "upload", result)?;
        Ok(if replacing {
            FileResult::Replaced
        } else {
            FileResult::Written
        })
    }

    /// Create `dirs` below `folder` as needed, each at most once per batch.
    /// Returns the deepest one, relative to `folder`.
    async fn ensure_dirs(
        &mut self,
        folder: &Target,
        dirs: &[String],
        created: &mut HashSet<PathBuf>,
    ) -> VfsResult<PathBuf> {
        let mut relative = PathBuf::new();
        for dir in dirs {
            relative.push(dir);
            if created.contains(&relative) {
                continue;
            }
            let backend = self.backend_of(&folder.mount)?;
            let full = folder.relative.join(&relative);
            let stat = backend.stat(&full).await;
            match self.guard(&folder.mount, "upload", stat)? {
                Some(NodeKind::Folder) => {}
                Some(NodeKind::File) => {
                    return Err(VfsError::name_conflict(full.display().to_string()));
                }
                None => {
                    let result = backend.mkdir(&full).await;
                    self.guard(&folder.mount, "upload", result)?;
                }
            }
            created.insert(relative.clone());
        }
        Ok(relative)
    }

    async fn finish_upload(&mut self, folder: &Target, report: &UploadReport) {
        self.resync(&folder.mount).await;
        info!(
            target = %folder.path,
            success = report.success,
            replaced = report.replaced,
            skipped = report.skipped,
            failed = report.failed,
            "upload finished"
        );
        self.emit(FsFlow::Uploaded {
            target: folder.path.clone(),
            success: report.written(),
            failed: report.failed,
            cancelled: report.cancelled,
        });
    }
}

/// Split a dropped file's relative path into validated segments.
fn split_relative(relative: &str) -> VfsResult<Vec<String>> {
    let parts: Vec<String> = relative
        .split(['/', '\\'])
        .filter(|p| !p.is_empty() && *p != ".")
        .map(str::to_string)
        .collect();
    if parts.is_empty() {
        return Err(VfsError::invalid_path(relative.to_string()));
    }
    for part in &parts {
        validate_name(part)?;
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::flows::shared_flow_bus;
    use crate::registry::WorkspaceRegistry;
    use crate::vfs::{DenyAll, VirtualStore};

    fn orchestrator() -> Orchestrator {
        let store = Arc::new(VirtualStore::in_memory().unwrap());
        let registry = WorkspaceRegistry::new(store, Arc::new(DenyAll));
        let mut orch = Orchestrator::new(registry, shared_flow_bus(64));
        orch.add_virtual_workspace("Scratch").unwrap();
        orch
    }

    /// Counts prompts; answers with a fixed choice.
    struct Counting {
        answer: bool,
        asked: AtomicUsize,
    }

    #[async_trait]
    impl Confirmer for Counting {
        async fn confirm(&self, _prompt: &Prompt) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    #[test]
    fn test_split_relative() {
        assert_eq!(
            split_relative("assets/./img/a.png").unwrap(),
            vec!["assets", "img", "a.png"]
        );
        assert!(split_relative("../etc/passwd").is_err());
        assert!(split_relative("//").is_err());
    }

    #[tokio::test]
    async fn test_upload_batch_counts() {
        let mut orch = orchestrator();
        orch.write_file("/scratch/a.lua", b"old").await.unwrap();

        let files = vec![
            UploadFile::bytes("a.lua", "new"),
            UploadFile::bytes("b.lua", "b"),
            UploadFile::bytes("bad/name", "x"),
        ];
        let report = orch
            .upload_batch(files, "/scratch", &AlwaysConfirm)
            .await
            .unwrap();
        assert_eq!(report.success, 1);
        assert_eq!(report.replaced, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].kind, VfsErrorKind::InvalidPath);
        assert_eq!(
            orch.read_file("/scratch/a.lua").await.unwrap().as_bytes(),
            b"new"
        );
        assert!(orch.tree().contains("/scratch/b.lua"));
    }

    #[tokio::test]
    async fn test_declined_replace_skips_file() {
        let mut orch = orchestrator();
        orch.write_file("/scratch/a.lua", b"old").await.unwrap();

        let confirm = Counting {
            answer: false,
            asked: AtomicUsize::new(0),
        };
        let files = vec![UploadFile::bytes("a.lua", "new"), UploadFile::bytes("c.lua", "c")];
        let report = orch.upload_batch(files, "/scratch", &confirm).await.unwrap();

        assert_eq!(confirm.asked.load(Ordering::SeqCst), 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.success, 1);
        assert_eq!(
            orch.read_file("/scratch/a.lua").await.unwrap().as_bytes(),
            b"old"
        );
    }

    #[tokio::test]
    async fn test_missing_disk_source_fails_only_that_file() {
        let mut orch = orchestrator();
        let files = vec![
            UploadFile::disk("/definitely/not/here.lua"),
            UploadFile::bytes("ok.lua", "x"),
        ];
        let report = orch
            .upload_batch(files, "/scratch", &AlwaysConfirm)
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].kind, VfsErrorKind::NotFound);
        assert_eq!(report.success, 1);
    }

    #[tokio::test]
    async fn test_folder_upload_builds_structure() {
        let mut orch = orchestrator();
        let files = vec![
            UploadFile::bytes("a.png", [1u8, 2]).with_relative_path("game/assets/a.png"),
            UploadFile::bytes("b.png", [3u8]).with_relative_path("game/assets/b.png"),
            UploadFile::bytes("main.lua", "x").with_relative_path("game/main.lua"),
        ];
        let report = orch
            .upload_folder_batch(files, "/scratch", &AlwaysConfirm, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.success, 3);
        assert!(!report.cancelled);
        assert!(orch.tree().contains("/scratch/game/assets/b.png"));
        assert!(orch.read_file("/scratch/game/assets/a.png").await.unwrap().is_binary());
    }

    #[tokio::test]
    async fn test_cancelled_folder_upload_stops_before_first_file() {
        let mut orch = orchestrator();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let files = vec![UploadFile::bytes("a.lua", "x").with_relative_path("dir/a.lua")];
        let report = orch
            .upload_folder_batch(files, "/scratch", &AlwaysConfirm, &cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.written(), 0);
        assert!(!orch.tree().contains("/scratch/dir"));
    }

    #[tokio::test]
    async fn test_upload_to_file_target_fails_up_front() {
        let mut orch = orchestrator();
        orch.write_file("/scratch/a.lua", b"").await.unwrap();
        let err = orch
            .upload_batch(vec![UploadFile::bytes("b.lua", "")], "/scratch/a.lua", &AlwaysConfirm)
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::InvalidPath(_)));
    }
}
