//! Isolated runner for generated simulation code.
//!
//! Contract
//! - `Sandbox::run` executes untrusted source text in a fresh subprocess with
//!   a temp working directory and a hard wall-clock timeout.
//! - It never returns an error: spawn failure, non-zero exit, crash, and
//!   timeout all map to `ExecutionResult { success: false, .. }` with a
//!   synthetic message in `stderr`.
//! - Plot output is redirected to files (`MPLBACKEND=Agg`); any `*.png` left
//!   in the working directory after exit is read back as a figure blob.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Wall-clock budget applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval for the child's exit status.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A figure file emitted by the simulation, read back as raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub name: String,
    #[serde(with = "bytes_b64")]
    pub bytes: Vec<u8>,
}

/// Everything observable from one run of generated code.
///
/// Captured once and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub return_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    pub figures: Vec<Figure>,
}

impl ExecutionResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            return_code: None,
            success: false,
            timed_out: false,
            figures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Interpreter invoked on the written source file.
    pub interpreter: String,
    /// Extra arguments placed before the source path.
    pub interpreter_args: Vec<String>,
    /// Filename the source is written to inside the temp dir.
    pub source_name: String,
    pub timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: Vec::new(),
            source_name: "simulation.py".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `code` to completion or timeout and capture everything observable.
    pub fn run(&self, code: &str) -> ExecutionResult {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(err) => {
                return ExecutionResult::failure(format!("sandbox setup failed: {err}"));
            }
        };
        let source_path = dir.path().join(&self.config.source_name);
        if let Err(err) = std::fs::write(&source_path, code) {
            return ExecutionResult::failure(format!("sandbox setup failed: {err}"));
        }

        let mut child = match Command::new(&self.config.interpreter)
            .args(&self.config.interpreter_args)
            .arg(&source_path)
            .current_dir(dir.path())
            .env("MPLBACKEND", "Agg")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                return ExecutionResult::failure(format!(
                    "failed to spawn `{}`: {err}",
                    self.config.interpreter
                ));
            }
        };

        // Drain pipes on threads so a chatty child cannot deadlock the poll loop.
        let stdout_handle = child.stdout.take().map(spawn_reader);
        let stderr_handle = child.stderr.take().map(spawn_reader);

        let started = Instant::now();
        let mut timed_out = false;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {
                    if started.elapsed() >= self.config.timeout {
                        timed_out = true;
                        let _ = child.kill();
                        let _ = child.wait();
                        break None;
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "try_wait failed; killing child");
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
            }
        };

        let stdout = join_reader(stdout_handle);
        let mut stderr = join_reader(stderr_handle);

        let return_code = status.and_then(|s| s.code());
        let success = status.map(|s| s.success()).unwrap_or(false) && !timed_out;
        if timed_out {
            if !stderr.is_empty() {
                stderr.push('\n');
            }
            stderr.push_str(&format!(
                "execution timed out after {:.1}s and was terminated",
                self.config.timeout.as_secs_f64()
            ));
        }

        let figures = collect_figures(dir.path());
        tracing::debug!(
            success,
            timed_out,
            return_code = ?return_code,
            figures = figures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sandbox run finished"
        );

        ExecutionResult {
            stdout,
            stderr,
            return_code,
            success,
            timed_out,
            figures,
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = source.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Read back every `*.png` the run left in its working directory.
fn collect_figures(dir: &std::path::Path) -> Vec<Figure> {
    let mut figures = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return figures;
    };
    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
        .collect();
    paths.sort();
    for path in paths {
        if let Ok(bytes) = std::fs::read(&path) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "figure.png".to_string());
            figures.push(Figure { name, bytes });
        }
    }
    figures
}

mod bytes_b64 {
    //! Base64 (de)serialization for figure bytes: figures travel inside JSON
    //! reports, raw byte arrays would bloat them.

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_sandbox(timeout: Duration) -> Sandbox {
        Sandbox::new(SandboxConfig {
            interpreter: "/bin/sh".to_string(),
            interpreter_args: Vec::new(),
            source_name: "run.sh".to_string(),
            timeout,
        })
    }

    #[test]
    fn captures_stdout_and_exit_status() {
        let sandbox = sh_sandbox(Duration::from_secs(5));
        let result = sandbox.run("echo hello; echo oops >&2");
        assert!(result.success);
        assert_eq!(result.return_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.stderr.trim(), "oops");
        assert!(!result.timed_out);
    }

    #[test]
    fn nonzero_exit_is_failure_not_error() {
        let sandbox = sh_sandbox(Duration::from_secs(5));
        let result = sandbox.run("echo bad >&2; exit 3");
        assert!(!result.success);
        assert_eq!(result.return_code, Some(3));
        assert!(result.stderr.contains("bad"));
    }

    #[test]
    fn infinite_loop_is_killed_within_timeout_plus_epsilon() {
        let sandbox = sh_sandbox(Duration::from_secs(2));
        let started = Instant::now();
        let result = sandbox.run("while true; do :; done");
        let elapsed = started.elapsed();
        assert!(!result.success);
        assert!(result.timed_out);
        assert!(result.stderr.contains("timed out"));
        assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
    }

    #[test]
    fn figures_are_collected_from_the_working_directory() {
        let sandbox = sh_sandbox(Duration::from_secs(5));
        let result = sandbox.run("printf 'PNG' > plot.png; printf 'x' > notes.txt");
        assert!(result.success);
        assert_eq!(result.figures.len(), 1);
        assert_eq!(result.figures[0].name, "plot.png");
        assert_eq!(result.figures[0].bytes, b"PNG");
    }

    #[test]
    fn missing_interpreter_maps_to_failure_result() {
        let sandbox = Sandbox::new(SandboxConfig {
            interpreter: "/nonexistent/interpreter".to_string(),
            ..SandboxConfig::default()
        });
        let result = sandbox.run("print('hi')");
        assert!(!result.success);
        assert!(result.stderr.contains("failed to spawn"));
    }

    #[test]
    fn execution_result_json_round_trip_preserves_figure_bytes() {
        let result = ExecutionResult {
            stdout: "ok".into(),
            stderr: String::new(),
            return_code: Some(0),
            success: true,
            timed_out: false,
            figures: vec![Figure {
                name: "plot.png".into(),
                bytes: vec![0, 255, 128, 7],
            }],
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: ExecutionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.figures[0].bytes, result.figures[0].bytes);
    }
}
