//! Idle time from the X11 MIT-SCREEN-SAVER extension.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{trace, warn};
use x11rb::connection::Connection;
use x11rb::protocol::screensaver::ConnectionExt as _;
use x11rb::protocol::xproto::Window;
use x11rb::rust_connection::RustConnection;

use super::IdleSampler;
use crate::episode::IdleSample;

/// Reads `ms_since_user_input` for the default screen.
pub struct X11Sampler {
    conn: Arc<RustConnection>,
    root: Window,
}

impl X11Sampler {
    /// Connect to `$DISPLAY` and check the extension is present.
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .context("X server reported no screens")?;

        let version = conn
            .screensaver_query_version(1, 1)
            .context("Failed to query MIT-SCREEN-SAVER")?
            .reply()
            .context("MIT-SCREEN-SAVER extension not available")?;
        trace!(
            "MIT-SCREEN-SAVER {}.{}",
            version.server_major_version, version.server_minor_version
        );

        Ok(Self {
            conn: Arc::new(conn),
            root,
        })
    }
}

/// Blocking QueryInfo round trip.
fn idle_millis(conn: &RustConnection, root: Window) -> Result<u32> {
    let info = conn
        .screensaver_query_info(root)
        .context("Failed to send QueryInfo")?
        .reply()
        .context("QueryInfo failed")?;
    Ok(info.ms_since_user_input)
}

impl IdleSampler for X11Sampler {
    async fn sample(&self) -> IdleSample {
        let conn = Arc::clone(&self.conn);
        let root = self.root;
        query_off_runtime(move || idle_millis(&conn, root)).await
    }
}

/// Run a blocking idle query on the blocking pool; any failure reads as zero.
async fn query_off_runtime<F>(query: F) -> IdleSample
where
    F: FnOnce() -> Result<u32> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(query)
        .await
        .context("X11 idle query task failed")
        .and_then(|millis| millis);

    match result {
        Ok(ms) => IdleSample::from_millis(u64::from(ms)),
        Err(e) => {
            warn!("Failed to read X11 idle time: {:#}", e);
            IdleSample::ZERO
        }
    }
}
