//! Engine configuration.
//!
//! The build-mode switches of the progress engine are plain fields resolved
//! once when the engine is built. Cargo features only change the defaults,
//! so a feature build and an explicit runtime config behave identically.

use crate::error::{ProgressError, ProgressResult};
use crate::state::MAX_VCIS;
use std::env;

/// Default global-sweep mask: a full sweep every 256th multi-context call.
pub const DEFAULT_POLL_MASK: u32 = 0xff;

/// Lock granularity the surrounding library runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockGranularity {
    /// Each context has its own lock; `wait` yields the OS thread.
    #[default]
    PerVci,
    /// One big lock covers every public operation; `wait` yields by
    /// releasing and reacquiring it.
    Global,
}

/// Progress engine configuration.
///
/// # Examples
///
/// ```
/// use vci_progress::config::{LockGranularity, ProgressConfig};
///
/// let config = ProgressConfig {
///     num_vcis: 4,
///     ..ProgressConfig::default()
/// };
/// assert_eq!(config.poll_mask, 0xff);
/// assert_eq!(config.lock_granularity, LockGranularity::PerVci);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressConfig {
    pub num_vcis: usize,
    pub poll_mask: u32,
    pub direct_netmod: bool,
    pub work_queues: bool,
    pub lock_granularity: LockGranularity,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            num_vcis: 1,
            poll_mask: DEFAULT_POLL_MASK,
            direct_netmod: cfg!(feature = "direct-netmod"),
            work_queues: cfg!(feature = "work-queues"),
            lock_granularity: if cfg!(feature = "global-lock") {
                LockGranularity::Global
            } else {
                LockGranularity::PerVci
            },
        }
    }
}

impl ProgressConfig {
    /// Largest context count this build accepts.
    pub const fn max_vcis() -> usize {
        if cfg!(feature = "single-vci") {
            1
        } else {
            MAX_VCIS
        }
    }

    /// Defaults overridden by `VCI_PROGRESS_*` environment variables.
    pub fn from_env() -> ProgressResult<Self> {
        let mut config = Self::default();

        if let Some(raw) = read_var("VCI_PROGRESS_NUM_VCIS") {
            config.num_vcis = raw.parse().map_err(|_| {
                ProgressError::InvalidConfig(format!("VCI_PROGRESS_NUM_VCIS={raw}"))
            })?;
        }
        if let Some(raw) = read_var("VCI_PROGRESS_POLL_MASK") {
            config.poll_mask = parse_mask(&raw).ok_or_else(|| {
                ProgressError::InvalidConfig(format!("VCI_PROGRESS_POLL_MASK={raw}"))
            })?;
        }
        if let Some(raw) = read_var("VCI_PROGRESS_DIRECT_NETMOD") {
            config.direct_netmod = parse_bool("VCI_PROGRESS_DIRECT_NETMOD", &raw)?;
        }
        if let Some(raw) = read_var("VCI_PROGRESS_WORK_QUEUES") {
            config.work_queues = parse_bool("VCI_PROGRESS_WORK_QUEUES", &raw)?;
        }
        if let Some(raw) = read_var("VCI_PROGRESS_LOCK_GRANULARITY") {
            config.lock_granularity = match raw.to_ascii_lowercase().as_str() {
                "global" => LockGranularity::Global,
                "per-vci" | "vci" => LockGranularity::PerVci,
                _ => {
                    return Err(ProgressError::InvalidConfig(format!(
                        "VCI_PROGRESS_LOCK_GRANULARITY={raw}"
                    )));
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> ProgressResult<()> {
        if self.num_vcis == 0 {
            return Err(ProgressError::InvalidConfig(
                "num_vcis must be at least 1".into(),
            ));
        }
        if self.num_vcis > Self::max_vcis() {
            return Err(ProgressError::TooManyContexts {
                requested: self.num_vcis,
                max: Self::max_vcis(),
            });
        }
        // The mask test only makes sense for a run of low bits.
        if self.poll_mask & self.poll_mask.wrapping_add(1) != 0 {
            return Err(ProgressError::InvalidConfig(format!(
                "poll_mask {:#x} is not of the form 2^k - 1",
                self.poll_mask
            )));
        }
        Ok(())
    }
}

fn read_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_mask(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

fn parse_bool(name: &str, raw: &str) -> ProgressResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ProgressError::InvalidConfig(format!("{name}={raw}"))),
    }
}
