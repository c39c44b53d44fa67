use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const STATS_FILE: &str = "stats.json";

/// What happened during one execution attempt, saved next to its logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    pub name: String,
    pub finished: bool,
    /// Seconds.
    pub duration: Option<f64>,
    /// GB.
    pub memory: Option<f64>,
    pub hostname: String,
}

impl JobStats {
    pub fn write(&self, exc_dir: &Path) -> Result<()> {
        let filename = exc_dir.join(STATS_FILE);
        util::fs::make_parent_dirs(&filename)?;
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&filename, text).with_context(|| format!("writing {filename:?}"))?;
        Ok(())
    }

    pub fn read(exc_dir: &Path) -> Result<Self> {
        let filename = exc_dir.join(STATS_FILE);
        let text = std::fs::read_to_string(&filename).with_context(|| format!("reading {filename:?}"))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Name of the machine this process runs on, or an empty string.
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: gethostname writes at most `buf.len()` bytes into the buffer we own.
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if ret != 0 {
        log::debug!("gethostname failed: {}", std::io::Error::last_os_error());
        return String::new();
    }
    // the name may fill the buffer without a terminating nul.
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_read() -> Result<()> {
        let dir = tempdir()?;
        let stats = JobStats {
            name: "/sample:s1/align".to_owned(),
            finished: true,
            duration: Some(1.5),
            memory: Some(0.25),
            hostname: hostname(),
        };
        stats.write(&dir.path().join("exc0"))?;
        assert_eq!(JobStats::read(&dir.path().join("exc0"))?, stats);
        Ok(())
    }

    #[test]
    fn test_hostname_is_clean() {
        let name = hostname();
        assert!(!name.contains('\0'));
        assert_eq!(name, name.trim());
    }
}
