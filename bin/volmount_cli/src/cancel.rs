//! Ctrl+C cancellation handling.

use std::sync::OnceLock;
use volmount_core::CancelToken;

static HANDLER_SET: OnceLock<()> = OnceLock::new();

/// Cancel `token` on Ctrl+C, so a pending device lookup stops waiting.
pub fn install_ctrlc_handler(token: CancelToken) -> anyhow::Result<()> {
    if HANDLER_SET.get().is_some() {
        return Ok(());
    }

    ctrlc::set_handler(move || {
        token.cancel();
        log::info!("Cancellation requested (Ctrl+C).");
    })?;

    let _ = HANDLER_SET.set(());
    Ok(())
}
