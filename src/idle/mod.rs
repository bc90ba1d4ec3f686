//! Idle time sampling.
//!
//! Every backend reports seconds since the last keyboard or mouse input.
//! A backend that cannot measure reports zero, so a broken source never
//! opens an idle episode.

pub mod logind;
pub mod x11;

use std::env;
use std::future::Future;

use tracing::{info, warn};

use crate::episode::IdleSample;
pub use logind::LogindSampler;
pub use x11::X11Sampler;

/// Source of idle samples.
pub trait IdleSampler: Send + Sync {
    /// Seconds since the last user input. Never fails; unavailable means zero.
    fn sample(&self) -> impl Future<Output = IdleSample> + Send;
}

/// Idle source chosen for the current session.
pub enum SystemSampler {
    /// X server with the MIT-SCREEN-SAVER extension.
    X11(X11Sampler),
    /// systemd-logind session idle hint.
    Logind(LogindSampler),
    /// No usable source; always reports zero.
    Unavailable,
}

impl SystemSampler {
    /// Pick the best available backend: X11, then logind.
    pub async fn detect() -> Self {
        if env::var_os("DISPLAY").is_some() {
            match X11Sampler::connect() {
                Ok(sampler) => {
                    info!("Using X11 screensaver extension for idle time");
                    return Self::X11(sampler);
                }
                Err(e) => warn!("X11 idle source unavailable: {:#}", e),
            }
        }

        match LogindSampler::connect().await {
            Ok(sampler) => {
                info!("Using systemd-logind idle hint for idle time");
                Self::Logind(sampler)
            }
            Err(e) => {
                warn!("logind idle source unavailable: {:#}", e);
                warn!("No idle time source available, the machine will never be reported idle");
                Self::Unavailable
            }
        }
    }

    /// Short backend name for diagnostics.
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::X11(_) => "x11",
            Self::Logind(_) => "logind",
            Self::Unavailable => "unavailable",
        }
    }
}

impl IdleSampler for SystemSampler {
    async fn sample(&self) -> IdleSample {
        match self {
            Self::X11(sampler) => sampler.sample().await,
            Self::Logind(sampler) => sampler.sample().await,
            Self::Unavailable => IdleSample::ZERO,
        }
    }
}
