//! Recompute pipeline boundary
//!
//! The scheduler only ever sees [`RecomputeOrchestrator::update`]; what it takes
//! to fetch data and rebuild a chart lives behind one of the adapters here.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error};

use crate::error::{RecomputeError, RecomputeResult};
use crate::models::ChartId;

/// Placeholder substituted with the chart id in command arguments
pub const CHART_ID_PLACEHOLDER: &str = "{chart_id}";

/// Rebuilds and persists the data behind one chart.
#[async_trait]
pub trait RecomputeOrchestrator: Send + Sync {
    async fn update(&self, chart_id: ChartId) -> RecomputeResult<()>;
}

/// Runs an external program once per chart update
pub struct CommandOrchestrator {
    program: String,
    args: Vec<String>,
}

impl CommandOrchestrator {
    /// Create a new CommandOrchestrator
    ///
    /// # Arguments
    /// * `program` - Executable to run
    /// * `args` - Arguments; `{chart_id}` is replaced with the chart being updated
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn render_args(&self, chart_id: ChartId) -> Vec<String> {
        let id = chart_id.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(CHART_ID_PLACEHOLDER, &id))
            .collect()
    }
}

#[async_trait]
impl RecomputeOrchestrator for CommandOrchestrator {
    async fn update(&self, chart_id: ChartId) -> RecomputeResult<()> {
        let args = self.render_args(chart_id);
        debug!(chart_id = %chart_id, program = %self.program, ?args, "Running recompute command");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RecomputeError::Spawn { chart_id, source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(chart_id = %chart_id, status = %output.status, "Recompute command failed: {}", stderr.trim());
            return Err(RecomputeError::Pipeline {
                chart_id,
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        Ok(())
    }
}

/// Asks the chart API to rebuild a chart over HTTP
pub struct HttpOrchestrator {
    base_url: String,
    client: ureq::Agent,
}

impl HttpOrchestrator {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(timeout)
            .http_status_as_error(false)
            .build();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: ureq::Agent::new_with_config(config),
        }
    }

    pub fn update_url(&self, chart_id: ChartId) -> String {
        format!("{}/api/v1/charts/{}/update", self.base_url, chart_id)
    }
}

#[async_trait]
impl RecomputeOrchestrator for HttpOrchestrator {
    async fn update(&self, chart_id: ChartId) -> RecomputeResult<()> {
        let url = self.update_url(chart_id);
        let client = self.client.clone();

        // ureq is blocking
        let status = tokio::task::spawn_blocking(move || {
            client
                .post(&url)
                .send(&[] as &[u8])
                .map(|response| response.status().as_u16())
        })
        .await
        .map_err(|e| RecomputeError::Pipeline {
            chart_id,
            message: format!("update task failed: {e}"),
        })?
        .map_err(|e| RecomputeError::Pipeline {
            chart_id,
            message: format!("failed to post update: {e}"),
        })?;

        match status {
            200..=299 => Ok(()),
            404 => Err(RecomputeError::ChartNotFound(chart_id)),
            code => Err(RecomputeError::Pipeline {
                chart_id,
                message: format!("chart API returned HTTP {code}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_args_substitute_chart_id() {
        let orchestrator = CommandOrchestrator::new(
            "node",
            vec![
                "scripts/update-chart.js".to_string(),
                "--chart={chart_id}".to_string(),
            ],
        );
        assert_eq!(
            orchestrator.render_args(ChartId(42)),
            vec!["scripts/update-chart.js", "--chart=42"]
        );
    }

    #[test]
    fn http_update_url_trims_trailing_slash() {
        let orchestrator = HttpOrchestrator::new("http://localhost:3210/", None);
        assert_eq!(
            orchestrator.update_url(ChartId(7)),
            "http://localhost:3210/api/v1/charts/7/update"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_exit_status_maps_to_result() {
        let ok = CommandOrchestrator::new("sh", vec!["-c".into(), "exit 0".into()]);
        ok.update(ChartId(1)).await.unwrap();

        let failing = CommandOrchestrator::new(
            "sh",
            vec!["-c".into(), "echo boom {chart_id} >&2; exit 3".into()],
        );
        match failing.update(ChartId(9)).await {
            Err(RecomputeError::Pipeline { chart_id, message }) => {
                assert_eq!(chart_id, ChartId(9));
                assert!(message.contains("boom 9"));
            }
            other => panic!("expected pipeline error, got {other:?}"),
        }
    }

    /// Answer one request with a bodiless response, yielding the request head
    async fn serve_once(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response =
                format!("HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&head).into_owned()
        });
        (format!("http://{addr}"), server)
    }

    #[tokio::test]
    async fn http_status_maps_to_result() {
        let (url, server) = serve_once("204 No Content").await;
        let orchestrator = HttpOrchestrator::new(&url, Some(Duration::from_secs(5)));
        orchestrator.update(ChartId(7)).await.unwrap();
        let head = server.await.unwrap();
        assert!(head.starts_with("POST /api/v1/charts/7/update HTTP/1.1"));

        let (url, _server) = serve_once("404 Not Found").await;
        let orchestrator = HttpOrchestrator::new(&url, Some(Duration::from_secs(5)));
        let err = orchestrator.update(ChartId(8)).await.unwrap_err();
        assert!(matches!(err, RecomputeError::ChartNotFound(ChartId(8))));

        let (url, _server) = serve_once("500 Internal Server Error").await;
        let orchestrator = HttpOrchestrator::new(&url, Some(Duration::from_secs(5)));
        match orchestrator.update(ChartId(9)).await {
            Err(RecomputeError::Pipeline { chart_id, message }) => {
                assert_eq!(chart_id, ChartId(9));
                assert!(message.contains("500"));
            }
            other => panic!("expected pipeline error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_chart_api_is_pipeline_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let orchestrator =
            HttpOrchestrator::new(&format!("http://{addr}"), Some(Duration::from_secs(5)));
        let err = orchestrator.update(ChartId(1)).await.unwrap_err();
        assert!(matches!(err, RecomputeError::Pipeline { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let orchestrator = CommandOrchestrator::new("definitely-not-a-real-binary-xyz", vec![]);
        let err = orchestrator.update(ChartId(3)).await.unwrap_err();
        assert!(matches!(err, RecomputeError::Spawn { .. }));
    }
}
