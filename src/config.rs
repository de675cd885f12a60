//! Cluster-wide tunables. Mirrors `rusty_db::Config`'s Default-then-override
//! shape: a plain struct with a `Default` impl, optionally overridden by a
//! JSON file read from the current directory at startup.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// N: size of the fixed cluster roster.
    pub n: u32,
    /// R: replica count per file.
    pub r: usize,
    /// Q: write quorum (acks required for a successful put).
    pub q: usize,
    /// V: number of historical versions kept per file, including current.
    pub v: usize,
    /// ceil(log2(N)) finger-table slots.
    pub finger_table_size: usize,

    pub ping_port: u16,
    pub ack_port: u16,
    pub introducer_port: u16,
    pub file_port: u16,
    pub grep_port: u16,

    #[serde(with = "duration_millis")]
    pub t_ping: Duration,
    #[serde(with = "duration_millis")]
    pub t_ack: Duration,
    #[serde(with = "duration_millis")]
    pub t_intro: Duration,

    /// Ordinal designated as the introducer. 1 by convention.
    pub introducer: u32,

    /// Hostname template: `{}` substituted with the zero-padded ordinal.
    pub host_template: String,

    /// Local data directory, wiped on start per the spec's deliberate
    /// ease-of-testing choice.
    pub data_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            n: 10,
            r: 4,
            q: 4,
            v: 4,
            finger_table_size: 4,
            ping_port: 5678,
            ack_port: 5679,
            introducer_port: 5680,
            file_port: 5681,
            grep_port: 5682,
            t_ping: Duration::from_millis(1500),
            t_ack: Duration::from_millis(1000),
            t_intro: Duration::from_millis(3000),
            introducer: 1,
            host_template: "sdfs-node-{}.local".to_string(),
            data_dir: "sdfs_files".to_string(),
        }
    }
}

impl Config {
    /// Load from `path` if it exists, falling back to defaults otherwise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn address_of(&self, ordinal: u32) -> String {
        let padded = if self.n <= 9 || ordinal >= 10 {
            ordinal.to_string()
        } else {
            format!("0{}", ordinal)
        };
        self.host_template.replace("{}", &padded)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
