pub mod alerts;
pub mod channel;
pub mod pattern;
pub mod policy;
pub mod schedule;
pub mod sla;
pub mod window;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use guardian_lib::policy::PolicyFile;
use std::path::Path;

/// Load the policy file named by `--policy`, `CGCTL_POLICY` or the config file
pub fn load_policy(path: Option<&Path>) -> Result<PolicyFile> {
    let path = path.context("No policy file; pass --policy or set CGCTL_POLICY")?;
    PolicyFile::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Parse an RFC 3339 instant, defaulting to now
pub fn parse_instant(value: Option<&str>) -> Result<DateTime<Utc>> {
    match value {
        Some(v) => Ok(DateTime::parse_from_rfc3339(v)
            .with_context(|| format!("Invalid timestamp '{}', expected RFC 3339", v))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}
