use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XmpError};
use crate::packet::DEFAULT_CAPACITY_STEP;

/// Configuration for packet writes.
///
/// ```
/// use tinyxmp::config::WriteOptions;
///
/// let opts = WriteOptions::from_json(r#"{ "capacity_step": 8192 }"#)?;
/// assert_eq!(opts.capacity_step, 8192);
/// assert_eq!(opts.packet_id, None);
/// # Ok::<(), tinyxmp::XmpError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// When a packet outgrows its slot, the new slot is the next multiple of
    /// this many bytes.
    pub capacity_step: usize,
    /// Fixed `id` attribute for packets framed on write.  A random one is
    /// generated per write when unset.
    pub packet_id:     Option<String>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            capacity_step: DEFAULT_CAPACITY_STEP,
            packet_id:     None,
        }
    }
}

impl WriteOptions {
    pub fn with_packet_id(mut self, id: impl Into<String>) -> Self {
        self.packet_id = Some(id.into());
        self
    }

    pub fn with_capacity_step(mut self, step: usize) -> Self {
        self.capacity_step = step;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let opts: Self = serde_json::from_str(json)
            .map_err(|e| XmpError::InvalidConfig(e.to_string()))?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| XmpError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity_step == 0 {
            return Err(XmpError::InvalidConfig("capacity_step must be positive".into()));
        }
        if let Some(id) = &self.packet_id {
            // The id is emitted verbatim inside a double-quoted attribute.
            if id.is_empty() || id.contains('"') || id.contains("?>") {
                return Err(XmpError::InvalidConfig(format!("unusable packet id {id:?}")));
            }
        }
        Ok(())
    }
}
