//! Terminal-side collaborators: confirmation prompts, name prompts and
//! directory grants, all answered on stdin.

use std::io::{BufRead, Write};

use async_trait::async_trait;
use canopy_kernel::{Confirmer, DirectoryHandle, PermissionGrant, Prompt, VfsError, VfsResult};

/// Reads answers from stdin; prompts go to stderr so stdout stays clean.
#[derive(Debug, Clone, Copy)]
pub struct Terminal {
    assume_yes: bool,
}

impl Terminal {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    /// Print `question` and read one line. `None` on end of input.
    pub async fn ask(&self, question: &str) -> Option<String> {
        let question = question.to_string();
        let line = tokio::task::spawn_blocking(move || -> std::io::Result<Option<String>> {
            eprint!("{question}");
            std::io::stderr().flush()?;
            let mut line = String::new();
            if std::io::stdin().lock().read_line(&mut line)? == 0 {
                return Ok(None);
            }
            Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
        })
        .await;
        match line {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "stdin read failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "prompt task failed");
                None
            }
        }
    }

    /// Yes/no question; `--yes` answers yes without asking.
    pub async fn agree(&self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        match self.ask(&format!("{question} [y/N] ")).await {
            Some(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            None => false,
        }
    }

    /// Show a confirmation dialog.
    pub async fn show(&self, prompt: &Prompt) -> bool {
        if !self.assume_yes {
            eprintln!("{}: {}", prompt.title, prompt.message);
        }
        self.agree(&format!("{}?", prompt.confirm_label)).await
    }
}

#[async_trait]
impl Confirmer for Terminal {
    async fn confirm(&self, prompt: &Prompt) -> bool {
        self.show(prompt).await
    }
}

#[async_trait]
impl PermissionGrant for Terminal {
    async fn request_permission(&self, handle: &DirectoryHandle) -> VfsResult<()> {
        let root = handle.root().display().to_string();
        if self.agree(&format!("Allow access to {root}?")).await {
            handle.grant();
            Ok(())
        } else {
            Err(VfsError::permission_denied(root))
        }
    }

    async fn pick_directory(&self, workspace_name: &str) -> VfsResult<DirectoryHandle> {
        let answer = self
            .ask(&format!("Directory for \"{workspace_name}\" (empty to refuse): "))
            .await
            .unwrap_or_default();
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(VfsError::permission_denied(workspace_name));
        }
        DirectoryHandle::open(answer)
    }
}
