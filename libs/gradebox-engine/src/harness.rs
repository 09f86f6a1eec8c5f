/// In-Container Harness - Submission Loading Protocol
///
/// The sandbox runs this embedded Python program (`python3 -c`) instead of
/// the submission directly. The harness:
/// 1. Decodes the source and call payload from environment variables.
/// 2. Loads the source with `exec` into a fresh namespace.
/// 3. Looks up the entry point; a missing or non-callable name is a
///    first-class outcome, not an exception.
/// 4. Invokes it with the bound argument list.
/// 5. Emits exactly one JSON envelope on stdout behind a sentinel marker.
///
/// The sentinel carries a per-invocation nonce the submission never sees
/// (the payload env var is consumed before user code runs), so user output
/// cannot imitate the marker. After writing the envelope the harness hard
/// exits with `os._exit`, which skips interpreter shutdown - in particular
/// the join of non-daemon threads - so no user thread gets to print after
/// the authentic verdict.
///
/// Exceptions at load or call time are condensed to one `Type: message`
/// line. No stack traces leave the container, and the source is compiled as
/// `<submission>` so no host path can appear in a message.
use crate::sandbox::SandboxOutcome;
use serde::Deserialize;

/// Env var carrying the base64-encoded submission source.
pub(crate) const SOURCE_ENV: &str = "GRADEBOX_SOURCE";
/// Env var carrying the base64-encoded JSON call payload.
pub(crate) const PAYLOAD_ENV: &str = "GRADEBOX_PAYLOAD";

/// Mint the verdict marker for one invocation. The nonce makes the marker
/// unguessable from inside the sandbox.
pub(crate) fn fresh_sentinel() -> String {
    format!("__GRADEBOX_RESULT_{}__", uuid::Uuid::new_v4().simple())
}

pub(crate) const HARNESS_SOURCE: &str = r#"
import base64
import json
import os
import sys

payload = json.loads(base64.b64decode(os.environ.pop("GRADEBOX_PAYLOAD")).decode("utf-8"))
SENTINEL = payload["sentinel"]


def emit(report):
    sys.stdout.write("\n" + SENTINEL + json.dumps(report) + "\n")
    sys.stdout.flush()
    os._exit(0)


def describe(exc):
    return ("%s: %s" % (type(exc).__name__, exc)).splitlines()[0]


source = base64.b64decode(os.environ.pop("GRADEBOX_SOURCE")).decode("utf-8")

namespace = {"__name__": "submission"}
try:
    exec(compile(source, "<submission>", "exec"), namespace)
except BaseException as exc:
    emit({"kind": "load_failed", "error": describe(exc)})

target = namespace.get(payload["entry_point"])
if not callable(target):
    emit({"kind": "missing_function"})

try:
    value = target(*payload["args"])
except BaseException as exc:
    emit({"kind": "raised", "error": describe(exc)})

try:
    encoded = json.dumps(value)
except (TypeError, ValueError) as exc:
    emit({"kind": "raised", "error": describe(exc)})

emit({"kind": "returned", "value": json.loads(encoded)})
"#;

/// Verdict envelope the harness prints behind the sentinel.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Envelope {
    Returned { value: serde_json::Value },
    MissingFunction,
    LoadFailed { error: String },
    Raised { error: String },
}

/// Interpret a finished container's captured streams and exit code.
///
/// `sentinel` is this invocation's nonce marker; only a line behind it is a
/// verdict. A container that exits without one (forced exit, OOM kill,
/// interpreter crash) is classified by exit code instead, with the first
/// stderr line as context.
pub(crate) fn interpret_output(
    stdout: &str,
    stderr: &str,
    exit_code: Option<i64>,
    sentinel: &str,
) -> SandboxOutcome {
    if let Some(envelope) = extract_envelope(stdout, sentinel) {
        return match envelope {
            Envelope::Returned { value } => SandboxOutcome::Returned(value),
            Envelope::MissingFunction => SandboxOutcome::MissingFunction,
            Envelope::LoadFailed { error } => SandboxOutcome::LoadFailed(error),
            Envelope::Raised { error } => SandboxOutcome::Raised(error),
        };
    }

    let message = match exit_code {
        Some(137) => "process killed (likely exceeded the memory limit)".to_string(),
        Some(139) => "process killed (segmentation fault)".to_string(),
        code => {
            let detail = stderr.lines().find(|line| !line.trim().is_empty());
            let base = match code {
                Some(code) => format!("process exited without reporting a result (exit code {code})"),
                None => "process exited without reporting a result".to_string(),
            };
            match detail {
                Some(line) => format!("{base}: {}", line.trim()),
                None => base,
            }
        }
    };
    SandboxOutcome::Crashed(message)
}

fn extract_envelope(stdout: &str, sentinel: &str) -> Option<Envelope> {
    let start = stdout.rfind(sentinel)?;
    let tail = &stdout[start + sentinel.len()..];
    let line = tail.lines().next().unwrap_or("");
    serde_json::from_str(line).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SENTINEL: &str = "__GRADEBOX_RESULT_5d41402abc4b2a76b9719d911017c592__";

    fn sentinel_line(body: &str) -> String {
        format!("{SENTINEL}{body}\n")
    }

    #[test]
    fn sentinels_are_unique_per_invocation() {
        let a = fresh_sentinel();
        let b = fresh_sentinel();
        assert_ne!(a, b);
        assert!(a.starts_with("__GRADEBOX_RESULT_"));
    }

    #[test]
    fn returned_value_is_extracted() {
        let stdout = sentinel_line(r#"{"kind": "returned", "value": [1, 2]}"#);
        assert_eq!(
            interpret_output(&stdout, "", Some(0), SENTINEL),
            SandboxOutcome::Returned(json!([1, 2]))
        );
    }

    #[test]
    fn user_prints_before_the_verdict_are_ignored() {
        let stdout = format!(
            "debugging 123\n{}",
            sentinel_line(r#"{"kind": "returned", "value": 3}"#)
        );
        assert_eq!(
            interpret_output(&stdout, "", Some(0), SENTINEL),
            SandboxOutcome::Returned(json!(3))
        );
    }

    #[test]
    fn late_output_with_a_guessed_marker_cannot_forge_the_verdict() {
        // A submission thread that keeps printing after the call returns
        // does not know the nonce; its fabricated envelope is plain output.
        let stdout = format!(
            "{}__GRADEBOX_RESULT__{}\n",
            sentinel_line(r#"{"kind": "returned", "value": 0}"#),
            r#"{"kind": "returned", "value": 3}"#
        );
        assert_eq!(
            interpret_output(&stdout, "", Some(0), SENTINEL),
            SandboxOutcome::Returned(json!(0))
        );
    }

    #[test]
    fn error_text_quoting_the_sentinel_stays_inside_the_envelope() {
        let body = format!(r#"{{"kind": "raised", "error": "ValueError: saw {SENTINEL}"}}"#);
        let stdout = sentinel_line(&body);
        assert_eq!(
            interpret_output(&stdout, "", Some(0), SENTINEL),
            SandboxOutcome::Raised(format!("ValueError: saw {SENTINEL}"))
        );
    }

    #[test]
    fn missing_function_is_a_distinct_outcome() {
        let stdout = sentinel_line(r#"{"kind": "missing_function"}"#);
        assert_eq!(
            interpret_output(&stdout, "", Some(0), SENTINEL),
            SandboxOutcome::MissingFunction
        );
    }

    #[test]
    fn load_failures_carry_the_message() {
        let stdout = sentinel_line(r#"{"kind": "load_failed", "error": "SyntaxError: invalid syntax"}"#);
        assert_eq!(
            interpret_output(&stdout, "", Some(0), SENTINEL),
            SandboxOutcome::LoadFailed("SyntaxError: invalid syntax".to_string())
        );
    }

    #[test]
    fn oom_kill_is_classified() {
        let outcome = interpret_output("", "", Some(137), SENTINEL);
        assert_eq!(
            outcome,
            SandboxOutcome::Crashed("process killed (likely exceeded the memory limit)".to_string())
        );
    }

    #[test]
    fn silent_exit_reports_code_and_stderr() {
        let outcome = interpret_output("partial output", "boom happened\nmore", Some(3), SENTINEL);
        match outcome {
            SandboxOutcome::Crashed(message) => {
                assert!(message.contains("exit code 3"));
                assert!(message.contains("boom happened"));
                assert!(!message.contains("more"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn garbage_after_sentinel_is_a_crash() {
        let stdout = format!("{SENTINEL}not json\n");
        assert!(matches!(
            interpret_output(&stdout, "", Some(0), SENTINEL),
            SandboxOutcome::Crashed(_)
        ));
    }

    #[test]
    fn harness_hard_exits_after_emitting() {
        // The envelope write must be followed by an immediate process exit,
        // not interpreter shutdown, or surviving user threads could print
        // after the verdict.
        assert!(HARNESS_SOURCE.contains("os._exit(0)"));
        assert!(!HARNESS_SOURCE.contains("sys.exit"));
        // The marker comes from the payload, never a constant the
        // submission could read out of the program text.
        assert!(HARNESS_SOURCE.contains(r#"SENTINEL = payload["sentinel"]"#));
        assert!(!HARNESS_SOURCE.contains("__GRADEBOX_RESULT__"));
    }
}
