use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Find, format and mount attached block volumes")]
pub struct Cli {
    /// TOML config file (backoff policy, default filesystem, command timeouts)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the disk serial derived from a volume ID
    Serial { volume_id: String },
    /// Wait for the device of a volume to appear and print its path
    Resolve {
        volume_id: String,
        /// Give up after this many seconds even if retries remain
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Rescan SCSI hosts and replay udev events
    Rescan,
    /// Resolve a volume's device, format it if blank, and mount it
    Mount {
        #[arg(long)]
        volume_id: String,
        #[arg(long)]
        target: PathBuf,
        #[arg(long, default_value = "")]
        fstype: String,
        /// Mount options, comma separated (e.g. "noatime,discard")
        #[arg(long, value_delimiter = ',')]
        options: Vec<String>,
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Unmount a path if mounted and remove it
    Cleanup {
        path: PathBuf,
        /// Unmount stacked mounts until none remain
        #[arg(long)]
        extensive: bool,
    },
    /// Print the device mounted at a path and its reference count
    DeviceName { mount_path: PathBuf },
    /// Grow the filesystem of a mounted volume
    Resize {
        #[arg(long)]
        device: PathBuf,
        #[arg(long)]
        mount_path: PathBuf,
    },
}
