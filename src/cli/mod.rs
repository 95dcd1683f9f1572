//! Command-line interface for inspecting a repository through its
//! file-system view.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::backend::{ChangeType, FsObjectStore};
use crate::error::GitFsError;
use crate::fs::GitFileSystem;
use crate::registry::GitFileSystems;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during CLI execution.
#[derive(Debug, Error)]
pub enum CliError {
    /// File-system error.
    #[error("{0}")]
    Fs(#[from] GitFsError),

    /// Object-store error.
    #[error("{0}")]
    Store(#[from] crate::backend::StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

// =============================================================================
// CLI Definition
// =============================================================================

/// gitjfs - read-only views over git-style repositories.
#[derive(Parser, Debug)]
#[command(name = "gitjfs", version, about, long_about = None)]
pub struct Cli {
    /// Directory of the object store to open.
    #[arg(long = "store", global = true, default_value = ".")]
    pub store: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List all refs.
    Refs,

    /// List the entries of a directory.
    #[command(name = "ls")]
    Ls {
        /// Logical path to list; relative paths use refs/heads/main.
        #[arg(default_value = "")]
        path: String,
    },

    /// Print the contents of a file.
    Cat {
        /// Logical path to read.
        path: String,
    },

    /// Show the commits reachable from the refs.
    Log,

    /// Show the changes between two commits.
    Diff {
        /// Old root, as a path-root string such as /refs/heads/main/.
        old: String,
        /// New root.
        new: String,
    },
}

impl Cli {
    /// Parse command-line arguments and return the CLI instance.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let store = FsObjectStore::open(&self.store).await?;
        let fs = GitFileSystems::default_registry().open_on_disk(store)?;

        let outcome = match &self.command {
            Command::Refs => run_refs(&fs).await,
            Command::Ls { path } => run_ls(&fs, path).await,
            Command::Cat { path } => run_cat(&fs, path).await,
            Command::Log => run_log(&fs).await,
            Command::Diff { old, new } => run_diff(&fs, old, new).await,
        };

        let closed = fs.close();
        outcome?;
        closed?;
        Ok(())
    }
}

async fn run_refs(fs: &Arc<GitFileSystem>) -> Result<()> {
    for root in fs.refs().await? {
        let commit = fs.commit_of(&root).await?;
        println!("{}  {}", commit.id, root);
    }
    Ok(())
}

async fn run_ls(fs: &Arc<GitFileSystem>, path: &str) -> Result<()> {
    let dir = fs.get_path(path, &[])?;
    let stream = fs.new_directory_stream(&dir, None).await?;
    let mut entries = stream.iterator()?;
    while let Some(entry) = entries.next()? {
        let attributes = fs.read_attributes(&entry, false).await?;
        let marker = if attributes.is_directory() {
            "/"
        } else if attributes.is_symbolic_link() {
            "@"
        } else {
            ""
        };
        let name = entry
            .file_name()
            .map(|name| name.to_string())
            .unwrap_or_default();
        println!("{}{}", name, marker);
    }
    stream.close();
    Ok(())
}

async fn run_cat(fs: &Arc<GitFileSystem>, path: &str) -> Result<()> {
    let path = fs.get_path(path, &[])?;
    let mut channel = fs.new_byte_channel(&path, &[]).await?;
    let mut contents = Vec::with_capacity(channel.size() as usize);
    channel.read_to_end(&mut contents)?;
    let mut stdout = std::io::stdout().lock();
    std::io::Write::write_all(&mut stdout, &contents)?;
    Ok(())
}

async fn run_log(fs: &Arc<GitFileSystem>) -> Result<()> {
    let graph = fs.graph().await?;
    let mut nodes: Vec<_> = graph.nodes().collect();
    nodes.sort_by_key(|node| std::cmp::Reverse(node.committer.when));
    for node in nodes {
        println!(
            "{}  {}  {} <{}>",
            node.id,
            node.committer.when.to_rfc3339(),
            node.author.name,
            node.author.email
        );
    }
    Ok(())
}

async fn run_diff(fs: &Arc<GitFileSystem>, old: &str, new: &str) -> Result<()> {
    let old = fs.get_path_root_from_str(old)?;
    let new = fs.get_path_root_from_str(new)?;
    for entry in fs.diff(&old, &new).await? {
        let letter = match entry.change_type {
            ChangeType::Add => "A",
            ChangeType::Delete => "D",
            ChangeType::Modify => "M",
            ChangeType::Rename => "R",
            ChangeType::Copy => "C",
        };
        println!("{}  {}", letter, entry.path());
    }
    Ok(())
}

/// Main entry point for the CLI.
pub async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli.run().await
}
