//! Dispatch results

use serde::{Deserialize, Serialize};

/// Outcome of one (device x copy) print attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub device_id: String,
    /// 1-based copy number
    pub copy: u32,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchResult {
    pub fn ok(device_id: impl Into<String>, copy: u32) -> Self {
        Self {
            device_id: device_id.into(),
            copy,
            success: true,
            error: None,
        }
    }

    pub fn failed(device_id: impl Into<String>, copy: u32, error: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            copy,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Count successful attempts, e.g. "3 of 4 kitchen printers succeeded"
pub fn success_count(results: &[DispatchResult]) -> usize {
    results.iter().filter(|r| r.success).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_count() {
        let results = vec![
            DispatchResult::ok("a", 1),
            DispatchResult::failed("b", 1, "Timeout"),
            DispatchResult::ok("c", 1),
        ];
        assert_eq!(success_count(&results), 2);
        assert_eq!(results[1].error.as_deref(), Some("Timeout"));
    }
}
