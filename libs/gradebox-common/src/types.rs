use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered parameter-name → value mapping for one test case.
///
/// Insertion order is significant: when the submitted function's parameter
/// order is unknown, arguments are bound in the order the caller supplied
/// them (serde_json is built with `preserve_order` for exactly this reason).
pub type InputMap = serde_json::Map<String, Value>;

/// A single test case: structured inputs plus the expected return value.
/// Owned by the caller; the grading core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub input: InputMap,
    pub expected: Value,
}

/// Untrusted user submission: raw source text and the name of the function
/// the grader must locate and call. Never persisted, never partially trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub source: String,
    pub entry_point: String,
}

/// Outcome of grading one test case.
///
/// At most one of `actual`/`error` is present: a successful call records
/// `actual`, every failure path records a one-line `error`. `passed` is true
/// iff `actual` is present and structurally equal to `expected`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub passed: bool,
    pub input: InputMap,
    pub expected: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate verdict for one batch, results in caller-supplied order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchVerdict {
    pub results: Vec<ExecutionResult>,
    pub passed_count: usize,
    pub total_count: usize,
}

/// Request body for the `run` operation (sample cases only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub code: String,
    pub function_name: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// Request body for the `submit` operation (sample + hidden cases).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub code: String,
    pub function_name: String,
    #[serde(default)]
    pub sample_test_cases: Vec<TestCase>,
    #[serde(default)]
    pub hidden_test_cases: Vec<TestCase>,
}

/// Response for `run`: full per-case detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub results: Vec<ExecutionResult>,
    pub passed: usize,
    pub total: usize,
}

/// Response for `submit`.
///
/// `visible_results` is the sample-case prefix only; hidden cases contribute
/// to the counts and `accepted` but their inputs, expected values, and error
/// messages are withheld by contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReport {
    pub visible_results: Vec<ExecutionResult>,
    pub passed: usize,
    pub total: usize,
    pub accepted: bool,
}
