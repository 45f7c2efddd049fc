use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Host directory mirrored into the image root
    #[arg(long, short)]
    pub source: PathBuf,

    /// Output directory
    #[arg(long, short = 'O')]
    pub out_dir: PathBuf,

    /// Image size in MiB
    #[arg(long, default_value_t = 64)]
    pub size_mib: u64,

    /// Put an LRU sector cache in front of the image file
    #[arg(long)]
    pub cache: bool,
}
