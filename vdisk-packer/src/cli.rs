use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Pack a host directory tree into a new virtual disk image
    Pack {
        /// Host directory to import
        #[arg(long, short)]
        source: PathBuf,

        /// Image file to create, must not exist yet
        #[arg(long, short)]
        out: PathBuf,

        /// Image capacity in MiB
        #[arg(long, default_value_t = 1)]
        size_mib: u64,
    },

    /// List every entry of a virtual disk image
    Ls {
        image: PathBuf,
    },
}
