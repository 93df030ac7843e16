use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Fold programs into spatial bricks and hot-reload them on the GPU"
)]
pub struct Cli {
    /// Host configuration file (TOML).
    #[arg(long, global = true, value_parser)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Encode a file into a brick.
    Fold {
        source: PathBuf,
        /// Output brick path. Defaults to the source path with a `.brick` extension.
        #[arg(long, short = 'o', value_parser)]
        output: Option<PathBuf>,
        /// Grid order. Defaults to the smallest order that fits.
        #[arg(long)]
        order: Option<u8>,
        /// Bytes per pixel.
        #[arg(long)]
        bpp: Option<u8>,
    },
    /// Validate and decode a brick. Writes to stdout when no output is given.
    Unfold {
        brick: PathBuf,
        #[arg(long, short = 'o', value_parser)]
        output: Option<PathBuf>,
    },
    /// Print header facts and the validation report of a brick.
    Inspect {
        brick: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Write the brick payload as a PNG.
    ExportPng { brick: PathBuf, output: PathBuf },
    /// Replace the brick payload with the pixels of an edited PNG.
    ImportPng {
        brick: PathBuf,
        png: PathBuf,
        /// Output brick path. Defaults to overwriting the input brick.
        #[arg(long, short = 'o', value_parser)]
        output: Option<PathBuf>,
    },
    /// Open a window and hot-reload the entry program.
    Run {
        /// Source or brick to load. Defaults to `entry` from the config.
        entry: Option<PathBuf>,
    },
}
