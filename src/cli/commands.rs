use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tl", about = concat!("tl v", env!("CARGO_PKG_VERSION"), " - a hierarchical todo list"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: $TASKLIST_CONFIG, then ~/.config/tasklist/config.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open the interactive list (the default)
    View,
    /// Write a default config and create the backend storage
    Init(InitArgs),
    /// Print open tasks by category
    List(ListArgs),
    /// Show every field of a task
    Show(IdArgs),
    /// Add a task
    Add(AddArgs),
    /// Edit a task in $EDITOR
    Edit(IdArgs),
    /// Mark a task and its subtasks complete
    Done(IdArgs),
    /// Delete a task and its subtasks
    Rm(IdArgs),
    /// Move a task under another parent or into another category
    Mv(MvArgs),
    /// Import tasks from a pipe-delimited file
    Import(ImportArgs),
    /// Write all tasks as a pipe-delimited table to stdout
    Export,
    /// Show changes that could not be saved
    Recovery(RecoveryArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct ListArgs {
    /// Include completed tasks and categories
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct IdArgs {
    /// Task ID
    pub id: String,
}

#[derive(Args)]
pub struct AddArgs {
    /// Task name
    pub name: String,
    /// Category (default: the parent's category)
    #[arg(long, short = 'C')]
    pub category: Option<String>,
    /// Make this a subtask of the given task ID
    #[arg(long, short)]
    pub parent: Option<String>,
    /// Set an extra field (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,
}

#[derive(Args)]
pub struct MvArgs {
    /// Task ID to move
    pub id: String,
    /// New parent task ID
    #[arg(long, conflicts_with = "root")]
    pub parent: Option<String>,
    /// Make it a top-level task
    #[arg(long)]
    pub root: bool,
    /// New category
    #[arg(long, short = 'C')]
    pub category: Option<String>,
}

#[derive(Args)]
pub struct ImportArgs {
    /// File to import, or - for stdin
    pub file: String,
}

#[derive(Args)]
pub struct RecoveryArgs {
    /// Maximum number of entries to show
    #[arg(long)]
    pub limit: Option<usize>,
}
