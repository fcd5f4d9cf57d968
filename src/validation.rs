//! Input validation for the HTTP surface
//! Bounds every user-supplied string and numeric parameter before it
//! reaches storage or the embedding pipeline.

use anyhow::{anyhow, Result};

/// Maximum lengths for security
pub const MAX_INPUT_LENGTH: usize = 1_000;
pub const MAX_OUTPUT_LENGTH: usize = 2_000;
pub const MAX_CONTEXT_LENGTH: usize = 1_000;
pub const MAX_CATEGORY_LENGTH: usize = 50;
pub const MAX_RULE_PATTERN_LENGTH: usize = 256;
pub const MAX_RULE_ACTION_LENGTH: usize = 2_000;
pub const MAX_QUERY_LENGTH: usize = 1_000;
pub const MAX_MEMORIES_LIMIT: usize = 1_000;

/// Validate a required text field against a length budget
pub fn validate_text(field: &str, value: &str, max_len: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{field} cannot be empty"));
    }

    if value.len() > max_len {
        return Err(anyhow!(
            "{field} too long: {} chars (max: {max_len})",
            value.len()
        ));
    }

    Ok(())
}

/// Validate an optional text field
pub fn validate_optional_text(field: &str, value: Option<&str>, max_len: usize) -> Result<()> {
    match value {
        Some(v) if v.len() > max_len => Err(anyhow!(
            "{field} too long: {} chars (max: {max_len})",
            v.len()
        )),
        _ => Ok(()),
    }
}

/// Validate a similarity threshold override
pub fn validate_threshold(threshold: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(anyhow!(
            "threshold must be between 0.0 and 1.0, got: {threshold}"
        ));
    }
    if !threshold.is_finite() {
        return Err(anyhow!("threshold must be a finite number"));
    }
    Ok(())
}

/// Validate a rule priority
pub fn validate_priority(priority: i32) -> Result<()> {
    if !(1..=10).contains(&priority) {
        return Err(anyhow!("priority must be between 1 and 10, got: {priority}"));
    }
    Ok(())
}

/// Validate a memories list limit
pub fn validate_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(anyhow!("limit must be greater than 0"));
    }
    if limit > MAX_MEMORIES_LIMIT {
        return Err(anyhow!(
            "limit too large: {limit} (max: {MAX_MEMORIES_LIMIT})"
        ));
    }
    Ok(())
}

/// Validate a topic research interval in hours
pub fn validate_interval_hours(hours: u32) -> Result<()> {
    if hours == 0 {
        return Err(anyhow!("interval_hours must be greater than 0"));
    }
    // One year is already far beyond a useful refresh cadence
    if hours > 24 * 365 {
        return Err(anyhow!("interval_hours too large: {hours} (max: 8760)"));
    }
    Ok(())
}
