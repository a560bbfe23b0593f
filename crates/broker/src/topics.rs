//! Topic names for the three pipeline channels.

use serde::{Deserialize, Serialize};

/// Default topic names.
pub mod topic {
    pub const RAW_RECORDS: &str = "raw-records";
    pub const ENRICHED_RECORDS: &str = "enriched-records";
    pub const DEAD_LETTER: &str = "dead-letter";

    /// All topics the pipeline reads or writes.
    pub const ALL: &[&str] = &[RAW_RECORDS, ENRICHED_RECORDS, DEAD_LETTER];
}

/// Topic names used by this deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicNames {
    #[serde(default = "default_raw")]
    pub raw: String,
    #[serde(default = "default_enriched")]
    pub enriched: String,
    #[serde(default = "default_dead_letter")]
    pub dead_letter: String,
}

fn default_raw() -> String {
    topic::RAW_RECORDS.to_string()
}

fn default_enriched() -> String {
    topic::ENRICHED_RECORDS.to_string()
}

fn default_dead_letter() -> String {
    topic::DEAD_LETTER.to_string()
}

impl Default for TopicNames {
    fn default() -> Self {
        Self {
            raw: default_raw(),
            enriched: default_enriched(),
            dead_letter: default_dead_letter(),
        }
    }
}

impl TopicNames {
    pub fn all(&self) -> [&str; 3] {
        [self.raw.as_str(), self.enriched.as_str(), self.dead_letter.as_str()]
    }
}
