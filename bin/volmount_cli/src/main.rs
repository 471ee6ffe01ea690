use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use volmount_core::{
    disk_uuid_to_serial, CancelToken, LinuxHal, MountError, MountOptions, Mounter, MounterConfig,
};

mod cancel;
mod cli;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    volmount_core::logging::init(cli.log_file.as_deref(), cli.verbose);

    let config = match &cli.config {
        Some(path) => MounterConfig::load(path)?,
        None => MounterConfig::default(),
    };
    let mounter = Mounter::linux(config)?;

    let root = CancelToken::new();
    cancel::install_ctrlc_handler(root.clone())?;

    match cli.command {
        cli::Command::Serial { volume_id } => {
            println!("{}", disk_uuid_to_serial(&volume_id));
        }
        cli::Command::Resolve {
            volume_id,
            timeout_secs,
        } => {
            let ctx = with_timeout(&root, timeout_secs);
            let path = mounter.get_device_path(&ctx, &volume_id)?;
            println!("{}", path.display());
        }
        cli::Command::Rescan => mounter.trigger_rescan(&root),
        cli::Command::Mount {
            volume_id,
            target,
            fstype,
            options,
            timeout_secs,
        } => {
            let ctx = with_timeout(&root, timeout_secs);
            let device = mounter.get_device_path(&ctx, &volume_id)?;
            mounter.make_dir(&target)?;
            mounter
                .format_and_mount(&device, &target, &fstype, &MountOptions::with_options(options))
                .with_context(|| {
                    format!("Unable to mount {} at {}", device.display(), target.display())
                })?;
            println!("{}", device.display());
        }
        cli::Command::Cleanup { path, extensive } => {
            mounter.cleanup_mount_point(&path, extensive)?;
        }
        cli::Command::DeviceName { mount_path } => {
            let (device, refs) = mounter.get_device_name(&mount_path)?;
            if device.is_empty() {
                return Err(MountError::NotMounted(mount_path.display().to_string()).into());
            }
            println!("{device} {refs}");
        }
        cli::Command::Resize { device, mount_path } => {
            resize(&mounter, &device, &mount_path)?;
        }
    }
    Ok(())
}

fn with_timeout(root: &CancelToken, timeout_secs: Option<u64>) -> CancelToken {
    match timeout_secs {
        Some(secs) => root.child_with_timeout(Duration::from_secs(secs)),
        None => root.clone(),
    }
}

fn resize(mounter: &Mounter<LinuxHal>, device: &Path, mount_path: &Path) -> Result<()> {
    if !mounter.exists_path(mount_path)? {
        anyhow::bail!("{} does not exist", mount_path.display());
    }
    mounter
        .resize(device, mount_path)
        .with_context(|| format!("Unable to resize {}", device.display()))
}
