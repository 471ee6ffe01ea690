use env_logger::Target;
use std::fs;
use std::io;
use std::path::Path;

/// Install the process-wide logger.
///
/// Logs go to `log_file` when given and writable, otherwise to stderr. The
/// level defaults to Info (Debug with `verbose`) and `RUST_LOG` overrides it.
pub fn init(log_file: Option<&Path>, verbose: bool) {
    // If we cannot open the file (permissions, readonly FS, etc.), fall back to stderr.
    let target = log_file
        .and_then(|path| {
            (|| -> io::Result<Target> {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Ok(Target::Pipe(Box::new(file)))
            })()
            .ok()
        })
        .unwrap_or(Target::Stderr);

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(target)
        .init();
}
