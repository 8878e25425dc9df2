use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "fin-statements",
    version,
    about = "Financial statement table extraction from downloaded report pages"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Inventory(InventoryArgs),
    Process(ProcessArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, default_value = "fs-sheets")]
    pub download_root: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    #[arg(long, default_value = "fs-sheets")]
    pub download_root: PathBuf,

    #[arg(long)]
    pub reports_path: PathBuf,

    #[arg(long)]
    pub export_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub rules_path: Option<PathBuf>,

    #[arg(long = "trace-no")]
    pub trace_nos: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "fs-sheets")]
    pub download_root: PathBuf,
}
