//! Idle time via systemd-logind `DBus` interface.
//!
//! Reads `IdleHint` and `IdleSinceHint` from the current session. While the
//! hint is set, idle time is the wall-clock distance to `IdleSinceHint`.

use std::env;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{debug, trace, warn};
use zbus::Connection;

use super::IdleSampler;
use crate::episode::IdleSample;

/// `DBus` service and path for login1.
const LOGIND_SERVICE: &str = "org.freedesktop.login1";
const LOGIND_PATH: &str = "/org/freedesktop/login1";
const MANAGER_INTERFACE: &str = "org.freedesktop.login1.Manager";
const SESSION_INTERFACE: &str = "org.freedesktop.login1.Session";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Idle sampler backed by the logind session object.
pub struct LogindSampler {
    conn: Connection,
    session_path: String,
}

impl LogindSampler {
    /// Connect to the system bus and resolve the session path.
    pub async fn connect() -> Result<Self> {
        let conn = Connection::system()
            .await
            .context("Failed to connect to system DBus")?;

        let session_path = resolve_session_path(&conn).await?;
        debug!("Resolved session path: {}", session_path);

        Ok(Self { conn, session_path })
    }

    async fn idle_seconds(&self) -> Result<u64> {
        let idle = get_property(&self.conn, &self.session_path, "IdleHint")
            .await?
            .downcast_ref::<bool>()
            .map_err(|_| anyhow::anyhow!("IdleHint is not a boolean"))?;

        if !idle {
            trace!("IdleHint: false");
            return Ok(0);
        }

        let since_usec = get_property(&self.conn, &self.session_path, "IdleSinceHint")
            .await?
            .downcast_ref::<u64>()
            .map_err(|_| anyhow::anyhow!("IdleSinceHint is not a u64"))?;

        Ok(seconds_since(since_usec, SystemTime::now()))
    }
}

impl IdleSampler for LogindSampler {
    async fn sample(&self) -> IdleSample {
        match self.idle_seconds().await {
            Ok(secs) => IdleSample::from_secs(secs),
            Err(e) => {
                warn!("Failed to read logind idle hint: {:#}", e);
                IdleSample::ZERO
            }
        }
    }
}

/// Whole seconds from a realtime microsecond timestamp to `now`.
///
/// Zero for an unset timestamp or one in the future.
fn seconds_since(since_usec: u64, now: SystemTime) -> u64 {
    if since_usec == 0 {
        return 0;
    }
    let since = UNIX_EPOCH + Duration::from_micros(since_usec);
    now.duration_since(since).map_or(0, |elapsed| elapsed.as_secs())
}

/// Resolve the session object path for the current session.
async fn resolve_session_path(conn: &Connection) -> Result<String> {
    if let Ok(session_id) = env::var("XDG_SESSION_ID") {
        debug!("Using XDG_SESSION_ID: {}", session_id);

        let proxy = zbus::Proxy::new(conn, LOGIND_SERVICE, LOGIND_PATH, MANAGER_INTERFACE)
            .await
            .context("Failed to create Manager proxy")?;

        let path: zbus::zvariant::OwnedObjectPath = proxy
            .call("GetSession", &(&session_id,))
            .await
            .context("GetSession call failed")?;

        return Ok(path.to_string());
    }

    debug!("XDG_SESSION_ID not set, trying to find current session");

    for alias in ["self", "auto"] {
        let path = format!("{LOGIND_PATH}/session/{alias}");
        if get_property(conn, &path, "IdleHint").await.is_ok() {
            return Ok(path);
        }
    }

    anyhow::bail!(
        "Could not resolve session path. Set XDG_SESSION_ID or ensure logind session is available."
    )
}

/// Read one property from a session object.
async fn get_property(
    conn: &Connection,
    session_path: &str,
    name: &str,
) -> Result<zbus::zvariant::OwnedValue> {
    let proxy = zbus::Proxy::new(conn, LOGIND_SERVICE, session_path, PROPERTIES_INTERFACE)
        .await
        .context("Failed to create Properties proxy")?;

    proxy
        .call("Get", &(SESSION_INTERFACE, name))
        .await
        .with_context(|| format!("Failed to get {name} property"))
}
