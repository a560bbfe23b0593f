//! Test fixtures and record generators.

use processor_core::{ActivityRecord, EnrichedRecord};

/// Auth header accepted by the test router.
pub const TEST_AUTH_TOKEN: &str = "Bearer test-token";

/// A valid raw record.
pub fn activity_record(id: i64) -> ActivityRecord {
    ActivityRecord::new(id, format!("asset-{}", id), "192.168.1.10", "phishing")
}

/// `n` valid raw records with ids `0..n`.
pub fn activity_records(n: usize) -> Vec<ActivityRecord> {
    (0..n as i64).map(activity_record).collect()
}

/// An enriched record as the enrichment mock would produce it.
pub fn enriched_record(id: i64) -> EnrichedRecord {
    EnrichedRecord {
        id,
        asset: format!("asset-{}", id),
        ip: "192.168.1.10".to_string(),
        category: "phishing".to_string(),
        asn: "AS64500".to_string(),
        correlation_id: 10_000 + id,
    }
}

/// JSON ingest body for `records`.
pub fn ingest_body(records: &[ActivityRecord]) -> serde_json::Value {
    serde_json::json!({ "activityRecordList": records })
}

/// JSON ingest body built from raw values, for malformed input.
pub fn raw_ingest_body(records: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({ "activityRecordList": records })
}
