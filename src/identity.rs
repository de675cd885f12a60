//! Clock & Identity: process-local wall clock, own ordinal resolution, and
//! ordinal -> address lookup. Grounded on `shared.go`'s
//! `GetOwnServerNumber`/`GetServerAddressFromNumber` pair: own ordinal is
//! parsed out of the local hostname against the configured template.

use crate::config::Config;
use crate::error::{Result, SdfsError};
use std::time::{SystemTime, UNIX_EPOCH};

/// A node's fixed identity within the roster, in `[1..=n]`.
pub type Ordinal = u32;

/// Milliseconds since the epoch. Used as the incarnation clock: coarse, but
/// monotone enough within a single process's lifetime (§3 Invariant I2 only
/// requires the *owner* to advance it, not wall-clock precision).
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Resolve this process's ordinal. Honors `SDFS_ORDINAL` first (so a single
/// machine can run a full roster of processes for testing, the way the
/// original VM-hostname scheme could not); otherwise parses the local
/// hostname against `config.host_template`.
pub fn own_ordinal(config: &Config) -> Result<Ordinal> {
    if let Ok(raw) = std::env::var("SDFS_ORDINAL") {
        return raw
            .parse()
            .map_err(|_| SdfsError::Configuration(format!("invalid SDFS_ORDINAL: {raw}")));
    }
    let hostname = std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            std::process::Command::new("hostname")
                .output()
                .ok()
                .and_then(|o| String::from_utf8(o.stdout).ok())
        })
        .ok_or_else(|| SdfsError::Configuration("could not determine hostname".into()))?;
    ordinal_from_hostname(hostname.trim(), &config.host_template)
}

/// Parse `ordinal_from_hostname("sdfs-node-07.local", "sdfs-node-{}.local") == Ok(7)`.
pub fn ordinal_from_hostname(hostname: &str, template: &str) -> Result<Ordinal> {
    let (prefix, suffix) = template
        .split_once("{}")
        .ok_or_else(|| SdfsError::Configuration("host_template missing {}".into()))?;
    if !hostname.starts_with(prefix) || !hostname.ends_with(suffix) {
        return Err(SdfsError::Configuration(format!(
            "hostname {hostname} does not match template {template}"
        )));
    }
    let digits = &hostname[prefix.len()..hostname.len() - suffix.len()];
    digits
        .parse()
        .map_err(|_| SdfsError::Configuration(format!("non-numeric ordinal in {hostname}")))
}
