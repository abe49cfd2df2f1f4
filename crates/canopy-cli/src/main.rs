//! canopy: shell and explorer for canopy workspaces.
//!
//! Usage:
//!   # Interactive shell (default)
//!   canopy
//!
//!   # One-shot commands
//!   canopy add-virtual Scratch
//!   canopy touch /scratch --name main.lua
//!   canopy upload-dir /scratch ./assets
//!   canopy tree
//!
//! Relative paths resolve against the shell's current location (`cd`).
//! Logging goes to stderr; `RUST_LOG=debug` shows every backend call.

mod render;
mod terminal;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use canopy_kernel::path_tree::{ROOT, join, normalize_path};
use canopy_kernel::{
    CanopyConfig, Command, DirectoryHandle, Orchestrator, Outcome, SharedOrchestrator, UploadFile,
};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use walkdir::WalkDir;

use terminal::Terminal;

/// Workspace file explorer.
#[derive(Parser, Debug)]
#[command(name = "canopy")]
#[command(about = "Shell and explorer for canopy workspaces")]
struct Cli {
    /// Config file (default: ~/.config/canopy/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

/// One shell line.
#[derive(Parser, Debug)]
#[command(name = "canopy", no_binary_name = true)]
struct Line {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Re-read every workspace and print the tree
    Tree,
    /// Bytes stored per virtual workspace
    Usage,
    /// Create a virtual workspace
    AddVirtual { name: String },
    /// Mount a local directory
    AddLocal {
        dir: PathBuf,
        /// Display name (default: the directory's name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Unmount a workspace (virtual content is destroyed)
    Remove { mount: String },
    /// Re-grant access to a local workspace
    Reconnect { mount: String },
    /// Drop access to a local workspace
    Disconnect { mount: String },
    /// Rename a node, or a workspace by its mount path
    Rename { path: String, name: String },
    /// Create a file (prompts for its name unless --name is given)
    Touch {
        parent: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Create a folder (prompts for its name unless --name is given)
    Mkdir {
        parent: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete a file or folder
    Rm { path: String },
    /// Move into a folder (copies between workspaces)
    Mv { source: String, target_folder: String },
    /// Copy into a folder
    Cp { source: String, target_folder: String },
    /// Write a file from --text, --from, or stdin
    Write {
        path: String,
        #[arg(long, conflicts_with = "from")]
        text: Option<String>,
        #[arg(long)]
        from: Option<PathBuf>,
    },
    /// Print a file
    Cat { path: String },
    /// Upload host files into a folder
    Upload {
        target_folder: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Upload a host directory, keeping its structure (Ctrl-C cancels)
    UploadDir { target_folder: String, dir: PathBuf },
    /// Copy a project into a new virtual workspace
    Clone {
        path: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Change the current location
    Cd { path: String },
    /// Interactive shell
    Shell,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match cli.config.clone().or_else(CanopyConfig::default_path) {
        Some(path) => CanopyConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CanopyConfig::default(),
    };
    tracing::debug!(data_dir = %config.data_dir.display(), "config loaded");

    let terminal = Arc::new(Terminal::new(cli.yes));
    let mut orchestrator =
        Orchestrator::from_config(&config, terminal.clone()).context("opening workspace store")?;
    orchestrator.refresh().await;

    let mut session = Session {
        shared: SharedOrchestrator::new(orchestrator),
        terminal,
        cwd: ROOT.to_string(),
    };
    match cli.command {
        None | Some(Cmd::Shell) => session.shell().await,
        Some(cmd) => session.run(cmd).await,
    }
}

struct Session {
    shared: SharedOrchestrator,
    terminal: Arc<Terminal>,
    cwd: String,
}

impl Session {
    async fn shell(&mut self) -> Result<()> {
        loop {
            let Some(line) = self.terminal.ask(&format!("canopy:{}> ", self.cwd)).await else {
                return Ok(());
            };
            let words: Vec<&str> = line.split_whitespace().collect();
            match words.first() {
                None => continue,
                Some(&"exit") | Some(&"quit") => return Ok(()),
                Some(_) => {}
            }
            let command = match Line::try_parse_from(words) {
                Ok(line) => line.command,
                Err(e) => {
                    eprintln!("{e}");
                    continue;
                }
            };
            if let Cmd::Shell = command {
                continue;
            }
            if let Err(e) = self.run(command).await {
                eprintln!("error: {e:#}");
            }
        }
    }

    async fn run(&mut self, cmd: Cmd) -> Result<()> {
        match cmd {
            Cmd::Tree => {
                if let Some(Outcome::Tree(roots)) = self.exec(Command::Refresh).await? {
                    print!("{}", render::tree(&roots));
                }
            }
            Cmd::Usage => {
                let orch = self.shared.lock().await;
                let store = orch.registry().store();
                let rows = orch.registry().virtual_usage()?;
                print!("{}", render::usage(&rows, store.quota_bytes()));
            }
            Cmd::AddVirtual { name } => {
                if let Some(Outcome::Workspace(record)) =
                    self.exec(Command::AddVirtualWorkspace { name }).await?
                {
                    println!("{} mounted at {}", record.name, record.mount_path);
                }
            }
            Cmd::AddLocal { dir, name } => {
                let handle = DirectoryHandle::open(&dir)
                    .with_context(|| format!("opening {}", dir.display()))?;
                let name = name.unwrap_or_default();
                if let Some(Outcome::Workspace(record)) =
                    self.exec(Command::AddLocalWorkspace { name, handle }).await?
                {
                    println!("{} mounted at {}", record.name, record.mount_path);
                }
            }
            Cmd::Remove { mount } => {
                let mount_path = self.abs(&mount);
                if self.terminal.agree(&format!("Remove workspace {mount_path}?")).await {
                    self.exec(Command::RemoveWorkspace { mount_path }).await?;
                }
            }
            Cmd::Reconnect { mount } => {
                let mount_path = self.abs(&mount);
                self.exec(Command::ReconnectWorkspace { mount_path }).await?;
            }
            Cmd::Disconnect { mount } => {
                let mount_path = self.abs(&mount);
                self.exec(Command::DisconnectWorkspace { mount_path }).await?;
            }
            Cmd::Rename { path, name } => {
                let path = self.abs(&path);
                if let Some(outcome) = self.exec(Command::Rename { path, name }).await? {
                    print_outcome(&outcome);
                }
            }
            Cmd::Touch { parent, name } => {
                let parent = self.abs(&parent);
                self.create(Command::CreateFile { parent }, name).await?;
            }
            Cmd::Mkdir { parent, name } => {
                let parent = self.abs(&parent);
                self.create(Command::CreateFolder { parent }, name).await?;
            }
            Cmd::Rm { path } => {
                let path = self.abs(&path);
                if let Some(outcome) = self.exec(Command::RequestDelete { path }).await? {
                    print_outcome(&outcome);
                }
            }
            Cmd::Mv {
                source,
                target_folder,
            } => {
                let (source, target_folder) = (self.abs(&source), self.abs(&target_folder));
                if let Some(outcome) = self.exec(Command::Move { source, target_folder }).await? {
                    print_outcome(&outcome);
                }
            }
            Cmd::Cp {
                source,
                target_folder,
            } => {
                let (source, target_folder) = (self.abs(&source), self.abs(&target_folder));
                if let Some(outcome) = self.exec(Command::Copy { source, target_folder }).await? {
                    print_outcome(&outcome);
                }
            }
            Cmd::Write { path, text, from } => {
                let content = match (text, from) {
                    (Some(text), _) => text.into_bytes(),
                    (None, Some(file)) => tokio::fs::read(&file)
                        .await
                        .with_context(|| format!("reading {}", file.display()))?,
                    (None, None) => {
                        let mut buf = Vec::new();
                        tokio::io::stdin().read_to_end(&mut buf).await?;
                        buf
                    }
                };
                let path = self.abs(&path);
                if let Some(outcome) = self.exec(Command::WriteFile { path, content }).await? {
                    print_outcome(&outcome);
                }
            }
            Cmd::Cat { path } => {
                let path = self.abs(&path);
                if let Some(Outcome::Content { content, .. }) =
                    self.exec(Command::ReadFile { path }).await?
                {
                    if content.is_binary() {
                        println!("<binary, {} bytes>", content.len());
                    } else {
                        print!("{}", String::from_utf8_lossy(content.as_bytes()));
                    }
                }
            }
            Cmd::Upload {
                target_folder,
                files,
            } => {
                let files = files.into_iter().map(UploadFile::disk).collect();
                let target_folder = self.abs(&target_folder);
                let command = Command::UploadBatch {
                    files,
                    target_folder,
                    confirm: self.terminal.clone(),
                };
                if let Some(Outcome::Uploaded(report)) = self.exec(command).await? {
                    println!("{}", render::report(&report));
                }
            }
            Cmd::UploadDir { target_folder, dir } => {
                let files = collect_folder(&dir)?;
                let target_folder = self.abs(&target_folder);
                let cancel = CancellationToken::new();
                let watcher = {
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if tokio::signal::ctrl_c().await.is_ok() {
                            cancel.cancel();
                        }
                    })
                };
                let command = Command::UploadFolderBatch {
                    files,
                    target_folder,
                    confirm: self.terminal.clone(),
                    cancel,
                };
                let outcome = self.exec(command).await;
                watcher.abort();
                if let Some(Outcome::Uploaded(report)) = outcome? {
                    println!("{}", render::report(&report));
                }
            }
            Cmd::Clone { path, name } => {
                let path = self.abs(&path);
                if let Some(Outcome::Workspace(record)) =
                    self.exec(Command::CloneProject { path, name }).await?
                {
                    println!("cloned into {} ({})", record.mount_path, record.name);
                }
            }
            Cmd::Cd { path } => {
                let path = self.abs(&path);
                if let Some(Outcome::Location(location)) =
                    self.exec(Command::ResolveLocation { path }).await?
                {
                    self.cwd = location;
                }
            }
            Cmd::Shell => bail!("already in a shell"),
        }
        Ok(())
    }

    /// Run a command, showing any confirmation it asks for. `None` if the
    /// user declined.
    async fn exec(&self, command: Command) -> Result<Option<Outcome>> {
        let outcome = self.shared.execute(command).await?;
        match outcome {
            Outcome::NeedsConfirmation(request) => {
                if self.terminal.show(request.prompt()).await {
                    Ok(Some(self.shared.execute(Command::Confirm(request)).await?))
                } else {
                    eprintln!("cancelled");
                    Ok(None)
                }
            }
            outcome => Ok(Some(outcome)),
        }
    }

    /// Create a placeholder, then name it (or cancel on an empty answer).
    async fn create(&self, command: Command, name: Option<String>) -> Result<()> {
        let Some(Outcome::Created { path, .. }) = self.exec(command).await? else {
            bail!("create returned no path");
        };
        let placeholder = path.rsplit('/').next().unwrap_or_default().to_string();
        let name = match name {
            Some(name) => name,
            None => self
                .terminal
                .ask(&format!("Name [{placeholder}]: "))
                .await
                .unwrap_or_default(),
        };
        let name = name.trim();
        if name.is_empty() {
            self.exec(Command::CancelCreation { path }).await?;
            eprintln!("cancelled");
            return Ok(());
        }
        if let Some(outcome) = self
            .exec(Command::CommitCreation {
                path: path.clone(),
                name: name.to_string(),
            })
            .await?
        {
            print_outcome(&outcome);
        }
        Ok(())
    }

    fn abs(&self, path: &str) -> String {
        if path.starts_with('/') {
            normalize_path(path)
        } else {
            normalize_path(&join(&self.cwd, path))
        }
    }
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Renamed { from, to } | Outcome::Moved { from, to } => println!("{from} -> {to}"),
        Outcome::Copied { from, to } => println!("{from} => {to}"),
        Outcome::Workspace(record) => println!("{} ({})", record.name, record.mount_path),
        Outcome::Written { path, bytes } => println!("{path}: {bytes} bytes"),
        other => {
            if let Some(path) = other.path() {
                println!("{path}");
            }
        }
    }
}

/// Every file below `dir`, with paths relative to `dir`'s parent so the
/// folder itself is recreated at the target.
fn collect_folder(dir: &Path) -> Result<Vec<UploadFile>> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let base = dir.parent().unwrap_or(dir);
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(base).unwrap_or(entry.path());
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(UploadFile::disk(entry.path()).with_relative_path(relative.join("/")));
    }
    Ok(files)
}
