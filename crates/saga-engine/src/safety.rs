//! Safety gate evaluated on the pre-check payload.
//!
//! The gate is a pure function of the payload: it never calls an executor and
//! can be re-evaluated at any time. It fails closed, so a payload that does
//! not prove the account is empty of protected resources is unsafe.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource categories that block termination when present.
pub const DEFAULT_CRITICAL_RESOURCES: &[&str] = &["ebsVolumes", "rdsInstances"];

/// A tracked category with a nonzero count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceViolation {
    pub category: String,
    pub count: u64,
}

/// Result of evaluating a pre-check payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyVerdict {
    pub safe: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<ResourceViolation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SafetyVerdict {
    fn unsafe_because(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            violations: Vec::new(),
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafetyGate {
    tracked: Vec<String>,
}

impl SafetyGate {
    pub fn new<I, S>(tracked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tracked: tracked.into_iter().map(Into::into).collect(),
        }
    }

    /// Inspect `resourcesFound` for every tracked category.
    pub fn evaluate(&self, payload: &Value) -> SafetyVerdict {
        if payload.get("safeToTerminate").and_then(Value::as_bool) == Some(false) {
            let mut verdict = SafetyVerdict::unsafe_because("Pre-check reported account unsafe to terminate");
            verdict.violations = self.violations(payload);
            return verdict;
        }

        let Some(found) = payload.get("resourcesFound").and_then(Value::as_object) else {
            return SafetyVerdict::unsafe_because("Pre-check payload has no resourcesFound map");
        };

        let mut violations = Vec::new();
        for category in &self.tracked {
            match found.get(category).and_then(Value::as_u64) {
                Some(0) => {}
                Some(count) => violations.push(ResourceViolation {
                    category: category.clone(),
                    count,
                }),
                None => {
                    return SafetyVerdict::unsafe_because(format!(
                        "Pre-check count for {} is missing or not a number",
                        category
                    ));
                }
            }
        }

        if violations.is_empty() {
            return SafetyVerdict {
                safe: true,
                violations,
                reason: None,
            };
        }

        let reason = violations
            .iter()
            .map(|v| format!("{}={}", v.category, v.count))
            .collect::<Vec<_>>()
            .join(", ");
        SafetyVerdict {
            safe: false,
            violations,
            reason: Some(format!("Critical resources present: {}", reason)),
        }
    }

    pub fn is_safe(&self, payload: &Value) -> bool {
        self.evaluate(payload).safe
    }

    fn violations(&self, payload: &Value) -> Vec<ResourceViolation> {
        let Some(found) = payload.get("resourcesFound").and_then(Value::as_object) else {
            return Vec::new();
        };
        self.tracked
            .iter()
            .filter_map(|category| {
                let count = found.get(category).and_then(Value::as_u64)?;
                (count > 0).then(|| ResourceViolation {
                    category: category.clone(),
                    count,
                })
            })
            .collect()
    }
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new(DEFAULT_CRITICAL_RESOURCES.iter().copied())
    }
}
