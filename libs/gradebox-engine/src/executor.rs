/// Case Executor - Outcome Judging
///
/// **Core Responsibility:**
/// Run one test case through the sandbox and convert the classified outcome
/// into an `ExecutionResult`.
///
/// **Critical Properties:**
/// - Judging is a pure function: (outcome, case, entry point) → result
/// - Comparison is deep structural equality with no numeric coercion
/// - Every failure path ends in a well-formed result with a one-line error;
///   nothing at this layer can abort the batch
use crate::binder::bind_args;
use crate::sandbox::{CaseInvocation, Sandbox, SandboxOutcome};
use gradebox_common::types::{ExecutionResult, Submission, TestCase};

/// Fixed message for the timeout error kind; callers distinguish a timeout
/// from an ordinary exception by this string.
pub const TIMEOUT_ERROR: &str = "execution timed out";

/// Bind arguments, invoke the submission in the sandbox, judge the outcome.
pub async fn execute_case<S: Sandbox>(
    sandbox: &S,
    submission: &Submission,
    case: &TestCase,
) -> ExecutionResult {
    let args = bind_args(&case.input);
    let outcome = sandbox
        .run_case(CaseInvocation {
            source: &submission.source,
            entry_point: &submission.entry_point,
            args: &args,
        })
        .await;
    judge(outcome, case, &submission.entry_point)
}

/// Map a sandbox outcome onto the result contract: exactly one of `actual`
/// or `error` is populated, and `passed` is true only for a structurally
/// equal return value.
pub fn judge(outcome: SandboxOutcome, case: &TestCase, entry_point: &str) -> ExecutionResult {
    let mut result = ExecutionResult {
        passed: false,
        input: case.input.clone(),
        expected: case.expected.clone(),
        actual: None,
        error: None,
    };

    match outcome {
        SandboxOutcome::Returned(value) => {
            // serde_json equality is element-wise for arrays, key/value-wise
            // for objects, and exact for scalars (1 != 1.0).
            result.passed = value == case.expected;
            result.actual = Some(value);
        }
        SandboxOutcome::MissingFunction => {
            result.error = Some(format!("Function '{entry_point}' not found"));
        }
        SandboxOutcome::LoadFailed(message)
        | SandboxOutcome::Raised(message)
        | SandboxOutcome::Crashed(message) => {
            result.error = Some(first_line(&message));
        }
        SandboxOutcome::TimedOut => {
            result.error = Some(TIMEOUT_ERROR.to_string());
        }
        SandboxOutcome::SandboxFailed(message) => {
            result.error = Some(format!("sandbox failure: {}", first_line(&message)));
        }
    }

    result
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or("").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradebox_common::types::InputMap;
    use serde_json::json;

    fn case(expected: serde_json::Value) -> TestCase {
        let mut input = InputMap::new();
        input.insert("x".to_string(), json!(1));
        TestCase { input, expected }
    }

    #[test]
    fn matching_return_passes() {
        let result = judge(SandboxOutcome::Returned(json!(3)), &case(json!(3)), "add");
        assert!(result.passed);
        assert_eq!(result.actual, Some(json!(3)));
        assert!(result.error.is_none());
    }

    #[test]
    fn mismatching_return_records_the_actual_value() {
        let result = judge(SandboxOutcome::Returned(json!(-1)), &case(json!(3)), "add");
        assert!(!result.passed);
        assert_eq!(result.actual, Some(json!(-1)));
        assert!(result.error.is_none());
    }

    #[test]
    fn structural_equality_has_no_numeric_coercion() {
        let result = judge(SandboxOutcome::Returned(json!(3.0)), &case(json!(3)), "f");
        assert!(!result.passed);
    }

    #[test]
    fn nested_structures_compare_deeply() {
        let expected = json!({"pairs": [[1, "a"], [2, "b"]], "total": 2});
        let result = judge(SandboxOutcome::Returned(expected.clone()), &case(expected), "f");
        assert!(result.passed);
    }

    #[test]
    fn object_key_order_does_not_affect_equality() {
        let returned = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        let expected = serde_json::from_str(r#"{"a": 1, "b": 2}"#).unwrap();
        let result = judge(SandboxOutcome::Returned(returned), &case(expected), "f");
        assert!(result.passed);
    }

    #[test]
    fn missing_function_message_names_the_entry_point() {
        let result = judge(SandboxOutcome::MissingFunction, &case(json!(0)), "solve");
        assert_eq!(result.error.as_deref(), Some("Function 'solve' not found"));
        assert!(result.actual.is_none());
        assert!(!result.passed);
    }

    #[test]
    fn raised_errors_are_reduced_to_one_line() {
        let outcome = SandboxOutcome::Raised("ValueError: bad input\nsecond line".to_string());
        let result = judge(outcome, &case(json!(0)), "f");
        assert_eq!(result.error.as_deref(), Some("ValueError: bad input"));
    }

    #[test]
    fn timeout_uses_the_distinct_error_kind() {
        let result = judge(SandboxOutcome::TimedOut, &case(json!(0)), "f");
        assert_eq!(result.error.as_deref(), Some(TIMEOUT_ERROR));
        assert!(result.actual.is_none());
    }

    #[test]
    fn sandbox_failures_are_labelled() {
        let result = judge(SandboxOutcome::SandboxFailed("daemon gone".to_string()), &case(json!(0)), "f");
        assert_eq!(result.error.as_deref(), Some("sandbox failure: daemon gone"));
    }

    #[test]
    fn every_outcome_yields_at_most_one_of_actual_or_error() {
        let outcomes = vec![
            SandboxOutcome::Returned(json!(1)),
            SandboxOutcome::MissingFunction,
            SandboxOutcome::LoadFailed("SyntaxError: invalid syntax".to_string()),
            SandboxOutcome::Raised("TypeError: boom".to_string()),
            SandboxOutcome::TimedOut,
            SandboxOutcome::Crashed("process killed".to_string()),
            SandboxOutcome::SandboxFailed("daemon gone".to_string()),
        ];
        for outcome in outcomes {
            let result = judge(outcome, &case(json!(0)), "f");
            assert!(!(result.actual.is_some() && result.error.is_some()));
        }
    }
}
