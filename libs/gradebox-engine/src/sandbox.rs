/// Isolation Sandbox - Containment Boundary for Untrusted Code
///
/// **Core Responsibility:**
/// Run one submission invocation inside a disposable, resource-limited
/// container and report a classified outcome.
///
/// **Critical Architectural Boundary:**
/// - The sandbox knows HOW to contain and invoke (Docker, limits, timeout)
/// - The sandbox does NOT compare results or know grading rules
/// - Every failure folds into a `SandboxOutcome`; nothing propagates
///
/// **Containment Rules:**
/// 1. Fresh container per invocation - no state survives between test cases
/// 2. Network disabled, read-only root filesystem
/// 3. Memory / CPU / pids limits enforced by the container runtime
/// 4. Hard wall-clock timeout with forced kill - untrusted code is never
///    trusted to yield
/// 5. Container removal guaranteed via Drop guard, even on panic
use crate::harness::{self, HARNESS_SOURCE, PAYLOAD_ENV, SOURCE_ENV};
use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use gradebox_common::config::SandboxConfig;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Safety limits applied before anything reaches Docker.
const MAX_SOURCE_BYTES: usize = 1024 * 1024; // 1MB
const MAX_ARGS_BYTES: usize = 10 * 1024 * 1024; // 10MB
/// Cap on captured container output; only the tail is kept, which is where
/// the harness writes its verdict.
const MAX_CAPTURED_BYTES: usize = 1024 * 1024;

const PIDS_LIMIT: i64 = 64;

/// One invocation of the submitted entry point with bound arguments.
#[derive(Debug, Clone, Copy)]
pub struct CaseInvocation<'a> {
    pub source: &'a str,
    pub entry_point: &'a str,
    pub args: &'a [Value],
}

/// Classified result of one sandboxed invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxOutcome {
    /// The entry point returned a value.
    Returned(Value),
    /// The entry point does not resolve to a callable after load.
    MissingFunction,
    /// The source failed to parse or raised during top-level evaluation.
    LoadFailed(String),
    /// The located function raised during the call.
    Raised(String),
    /// The wall-clock limit expired and the container was killed.
    TimedOut,
    /// The process exited without reporting a verdict (forced exit, OOM
    /// kill, interpreter crash).
    Crashed(String),
    /// The isolation infrastructure itself failed.
    SandboxFailed(String),
}

/// The containment boundary the grader runs each test case through.
///
/// Implementations must be infallible at the signature level: every failure
/// mode, including their own, becomes a `SandboxOutcome` variant.
pub trait Sandbox {
    fn run_case(&self, invocation: CaseInvocation<'_>)
        -> impl Future<Output = SandboxOutcome> + Send;
}

/// Container cleanup guard - guarantees container removal on drop, even if
/// execution panics or the grading task is cancelled.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let docker = self.docker.clone();
        let container_id = self.container_id.clone();
        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(e) = docker.remove_container(&container_id, Some(remove_options)).await {
                warn!(container_id = %container_id, error = %e, "Failed to clean up container");
            }
        });
    }
}

/// Docker-backed sandbox: one hardened container per invocation.
pub struct DockerSandbox {
    docker: Docker,
    config: SandboxConfig,
}

impl DockerSandbox {
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon")?;
        Ok(Self { docker, config })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Verify the sandbox image is present, pulling it if necessary.
    async fn ensure_image(&self) -> Result<()> {
        let image = &self.config.image;
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss, pulling");
        let options = Some(CreateImageOptions {
            from_image: image.as_str(),
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(progress) = stream.next().await {
            progress.context("Failed to pull sandbox image")?;
        }
        info!(image = %image, "Image pulled");
        Ok(())
    }

    async fn run_case_inner(&self, invocation: CaseInvocation<'_>) -> Result<SandboxOutcome> {
        if invocation.source.len() > MAX_SOURCE_BYTES {
            bail!("source exceeds maximum size of {} bytes", MAX_SOURCE_BYTES);
        }
        let sentinel = harness::fresh_sentinel();
        let payload = serde_json::to_string(&json!({
            "entry_point": invocation.entry_point,
            "args": invocation.args,
            "sentinel": sentinel,
        }))?;
        if payload.len() > MAX_ARGS_BYTES {
            bail!("bound arguments exceed maximum size of {} bytes", MAX_ARGS_BYTES);
        }

        self.ensure_image()
            .await
            .with_context(|| format!("sandbox image '{}' unavailable", self.config.image))?;

        let env = vec![
            format!("{}={}", SOURCE_ENV, general_purpose::STANDARD.encode(invocation.source)),
            format!("{}={}", PAYLOAD_ENV, general_purpose::STANDARD.encode(&payload)),
        ];

        let container_config = Config {
            image: Some(self.config.image.clone()),
            cmd: Some(vec![
                "python3".to_string(),
                "-c".to_string(),
                HARNESS_SOURCE.to_string(),
            ]),
            env: Some(env),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true), // SECURITY: no network access
            host_config: Some(bollard::models::HostConfig {
                memory: Some(i64::from(self.config.memory_limit_mb) * 1024 * 1024),
                nano_cpus: Some((f64::from(self.config.cpu_limit) * 1_000_000_000.0) as i64),
                pids_limit: Some(PIDS_LIMIT),
                readonly_rootfs: Some(true), // harness never writes
                ..Default::default()
            }),
            ..Default::default()
        };

        let container_name = format!("gradebox-{}", uuid::Uuid::new_v4());
        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };
        let container = self
            .docker
            .create_container(Some(create_options), container_config)
            .await
            .context("Failed to create sandbox container")?;
        let container_id = container.id;

        // Cleanup guard goes up before the container starts, so removal is
        // guaranteed on every path below.
        let _guard = ContainerGuard {
            docker: self.docker.clone(),
            container_id: container_id.clone(),
        };

        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start sandbox container")?;

        let collect = async {
            let mut stdout = String::new();
            let mut stderr = String::new();

            let logs_options = Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: true,
                ..Default::default()
            });
            let mut logs = self.docker.logs(&container_id, logs_options);
            while let Some(output) = logs.next().await {
                match output {
                    Ok(LogOutput::StdOut { message }) => {
                        append_capped(&mut stdout, &String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        append_capped(&mut stderr, &String::from_utf8_lossy(&message));
                    }
                    Err(e) => {
                        warn!(error = %e, "Error reading container logs");
                        break;
                    }
                    _ => {}
                }
            }

            let wait_options = WaitContainerOptions {
                condition: "not-running",
            };
            let mut wait = self.docker.wait_container(&container_id, Some(wait_options));
            let exit_code = match wait.next().await {
                Some(Ok(response)) => Some(response.status_code),
                _ => None,
            };

            (stdout, stderr, exit_code)
        };

        let timeout = Duration::from_millis(self.config.timeout_ms);
        match tokio::time::timeout(timeout, collect).await {
            Ok((stdout, stderr, exit_code)) => {
                debug!(exit_code = ?exit_code, "Container finished");
                Ok(harness::interpret_output(&stdout, &stderr, exit_code, &sentinel))
            }
            Err(_) => {
                warn!(timeout_ms = self.config.timeout_ms, "Invocation timed out, killing container");
                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(error = %e, "Failed to kill timed-out container");
                }
                Ok(SandboxOutcome::TimedOut)
            }
        }
    }
}

impl Sandbox for DockerSandbox {
    #[tracing::instrument(skip(self, invocation), fields(entry_point = invocation.entry_point))]
    async fn run_case(&self, invocation: CaseInvocation<'_>) -> SandboxOutcome {
        match self.run_case_inner(invocation).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Sandbox infrastructure failure");
                SandboxOutcome::SandboxFailed(format!("{e:#}"))
            }
        }
    }
}

/// Keep only the tail of the stream once the cap is hit; the verdict
/// envelope is the last thing the harness writes.
fn append_capped(buffer: &mut String, chunk: &str) {
    buffer.push_str(chunk);
    if buffer.len() > MAX_CAPTURED_BYTES {
        let keep_from = buffer.len() - MAX_CAPTURED_BYTES / 2;
        let keep_from = (keep_from..buffer.len())
            .find(|i| buffer.is_char_boundary(*i))
            .unwrap_or(buffer.len());
        buffer.drain(..keep_from);
    }
}


/// Integration tests against a live Docker daemon, mirroring real grading
/// traffic end to end. Run with `cargo test -- --ignored`.
#[cfg(test)]
mod docker_tests {
    use super::*;
    use serde_json::json;

    fn sandbox() -> DockerSandbox {
        DockerSandbox::new(SandboxConfig::default()).expect("Failed to create Docker sandbox")
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn returns_the_function_result() {
        let args = vec![json!(1), json!(2)];
        let outcome = sandbox()
            .run_case(CaseInvocation {
                source: "def add(a, b):\n    return a + b\n",
                entry_point: "add",
                args: &args,
            })
            .await;
        assert_eq!(outcome, SandboxOutcome::Returned(json!(3)));
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn missing_entry_point_is_reported() {
        let outcome = sandbox()
            .run_case(CaseInvocation {
                source: "def add(a, b):\n    return a + b\n",
                entry_point: "multiply",
                args: &[],
            })
            .await;
        assert_eq!(outcome, SandboxOutcome::MissingFunction);
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn raising_code_is_summarized_in_one_line() {
        let args = vec![json!(1)];
        let outcome = sandbox()
            .run_case(CaseInvocation {
                source: "def broken(x):\n    return 1 / 0\n",
                entry_point: "broken",
                args: &args,
            })
            .await;
        assert_eq!(
            outcome,
            SandboxOutcome::Raised("ZeroDivisionError: division by zero".to_string())
        );
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn syntax_errors_are_load_failures() {
        let outcome = sandbox()
            .run_case(CaseInvocation {
                source: "def broken(:\n",
                entry_point: "broken",
                args: &[],
            })
            .await;
        assert!(matches!(outcome, SandboxOutcome::LoadFailed(message) if message.starts_with("SyntaxError")));
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn infinite_loops_are_killed_at_the_deadline() {
        let config = SandboxConfig {
            timeout_ms: 1_000,
            ..SandboxConfig::default()
        };
        let sandbox = DockerSandbox::new(config).expect("Failed to create Docker sandbox");
        let outcome = sandbox
            .run_case(CaseInvocation {
                source: "def spin():\n    while True:\n        pass\n",
                entry_point: "spin",
                args: &[],
            })
            .await;
        assert_eq!(outcome, SandboxOutcome::TimedOut);
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn background_thread_cannot_forge_the_verdict() {
        // A non-daemon thread that outlives the call and prints a fake
        // envelope must not override the authentic wrong answer.
        let source = r#"
import threading
import time

def lie():
    time.sleep(0.5)
    print('__GRADEBOX_RESULT__{"kind": "returned", "value": 3}')

threading.Thread(target=lie).start()

def add(a, b):
    return 0
"#;
        let args = vec![json!(1), json!(2)];
        let outcome = sandbox()
            .run_case(CaseInvocation {
                source,
                entry_point: "add",
                args: &args,
            })
            .await;
        assert_eq!(outcome, SandboxOutcome::Returned(json!(0)));
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn forced_exit_is_classified_as_crash() {
        let outcome = sandbox()
            .run_case(CaseInvocation {
                source: "import os\ndef escape():\n    os._exit(7)\n",
                entry_point: "escape",
                args: &[],
            })
            .await;
        assert!(matches!(outcome, SandboxOutcome::Crashed(_)));
    }
}
