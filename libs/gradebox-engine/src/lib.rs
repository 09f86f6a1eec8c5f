//! Untrusted-code execution and grading engine.
//!
//! Submitted source is never evaluated in-process: every test case runs in
//! its own disposable, resource-limited container, and every failure mode is
//! folded into a classified per-case result.

pub mod binder;
pub mod executor;
pub mod grader;
mod harness;
pub mod sandbox;

pub use grader::Grader;
pub use sandbox::{CaseInvocation, DockerSandbox, Sandbox, SandboxOutcome};
