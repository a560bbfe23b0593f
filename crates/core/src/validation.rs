//! Field validators for ingested records.

use regex::Regex;
use std::borrow::Cow;
use std::net::IpAddr;
use std::sync::LazyLock;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::category::Category;
use crate::limits::{MAX_HOSTNAME_LEN, MAX_INGEST_RECORDS};
use crate::records::ActivityRecord;

/// RFC 1123 hostname: dot-separated labels of alphanumerics and inner hyphens.
static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*\.?$")
        .expect("hostname regex is valid")
});

/// Accepts IPv4, IPv6, or a syntactically valid hostname.
pub fn validate_ip_or_host(ip: &str) -> Result<(), ValidationError> {
    let ip = ip.trim();
    if ip.is_empty() {
        return Err(error("ip_required", "IP address is required"));
    }

    if ip.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    // Dotted quads that failed to parse are malformed addresses, not hostnames.
    let all_numeric = ip.split('.').all(|l| l.chars().all(|c| c.is_ascii_digit()));
    if ip.len() <= MAX_HOSTNAME_LEN && !all_numeric && HOSTNAME_RE.is_match(ip) {
        return Ok(());
    }

    Err(error("invalid_ip", format!("Invalid IP address: {}", ip)))
}

/// Accepts one of the known category tokens (case-insensitive).
pub fn validate_category(category: &str) -> Result<(), ValidationError> {
    if category.trim().is_empty() {
        return Err(error("category_required", "Category is required"));
    }
    if Category::is_valid(category) {
        Ok(())
    } else {
        Err(error(
            "invalid_category",
            format!("Invalid category value: {}", category),
        ))
    }
}

fn error(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Validates an ingest request, returning per-field messages keyed as
/// `activityRecordList[i].field`.
pub fn validate_records(records: &[ActivityRecord]) -> Result<(), Vec<(String, String)>> {
    if records.is_empty() {
        return Err(vec![(
            "activityRecordList".to_string(),
            "must not be empty".to_string(),
        )]);
    }
    if records.len() > MAX_INGEST_RECORDS {
        return Err(vec![(
            "activityRecordList".to_string(),
            format!(
                "has {} records, exceeds {} limit",
                records.len(),
                MAX_INGEST_RECORDS
            ),
        )]);
    }

    let mut problems = Vec::new();
    for (i, record) in records.iter().enumerate() {
        if let Err(errors) = record.validate() {
            collect(&mut problems, i, &errors);
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        problems.sort();
        Err(problems)
    }
}

fn collect(problems: &mut Vec<(String, String)>, index: usize, errors: &ValidationErrors) {
    for (field, field_errors) in errors.field_errors() {
        for err in field_errors.iter() {
            let message = err
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| err.code.to_string());
            problems.push((format!("activityRecordList[{}].{}", index, field), message));
        }
    }
}
