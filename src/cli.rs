use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "digitscope")]
#[command(version)]
#[command(about = "MNIST digit classifier: offline trainer and prediction API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml plus the DIGITSCOPE_ENV overlay)
    #[arg(short, long, default_value = "config", env = "DIGITSCOPE_CONFIG_DIR")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve POST /predict from a trained artifact
    Serve {
        /// Port override (default from config: 5000)
        #[arg(short, long)]
        port: Option<u16>,
        /// Interface override
        #[arg(long)]
        host: Option<String>,
        /// Artifact path override
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
    /// Fit the classifier on MNIST and write the artifact
    #[cfg(feature = "train")]
    Train {
        /// Read uncompressed IDX files from this directory instead of downloading
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Artifact output path override
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Epoch count override
        #[arg(long)]
        epochs: Option<usize>,
        /// Batch size override
        #[arg(long)]
        batch_size: Option<usize>,
    },
}
