//! Shared fixtures: a canned-response HTTP server and fake collaborators.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use webvigil_contracts::{HtmlDiffReporter, Notifier};
use webvigil_model::{CycleSummary, DiffResult, FetchErrorInfo, FileChangeInfo, InterruptInfo};

/// One canned response served for a path.
#[derive(Clone, Debug)]
pub struct CannedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    pub etag: Option<String>,
    pub delay: Option<Duration>,
}

impl CannedResponse {
    pub fn ok(content_type: &str, body: &[u8]) -> Self {
        Self {
            status: 200,
            content_type: content_type.to_string(),
            body: body.to_vec(),
            etag: None,
            delay: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Default)]
struct ServerState {
    responses: HashMap<String, CannedResponse>,
    hits: HashMap<String, usize>,
}

/// Minimal HTTP/1.1 server serving canned responses over real sockets.
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    accept_task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("test server address");
        let state: Arc<Mutex<ServerState>> = Arc::default();

        let accept_state = Arc::clone(&state);
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = Arc::clone(&accept_state);
                tokio::spawn(async move {
                    let _ = serve_connection(stream, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            accept_task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn set_response(&self, path: &str, response: CannedResponse) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(path.to_string(), response);
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .hits
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    state: Arc<Mutex<ServerState>>,
) -> std::io::Result<()> {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 1024];
    while !raw.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        raw.extend_from_slice(&chunk[..read]);
        if raw.len() > 64 * 1024 {
            return Ok(());
        }
    }

    let head = String::from_utf8_lossy(&raw);
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    let if_none_match = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("if-none-match"))
        .map(|(_, value)| value.trim().to_string());

    let response = {
        let mut state = state.lock().unwrap();
        *state.hits.entry(path.clone()).or_insert(0) += 1;
        state.responses.get(&path).cloned()
    };

    let Some(response) = response else {
        let payload = b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found";
        stream.write_all(payload).await?;
        return Ok(());
    };

    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }

    let not_modified = matches!(
        (&response.etag, &if_none_match),
        (Some(expected), Some(sent)) if expected == sent
    );

    let mut head = if not_modified {
        String::from("HTTP/1.1 304 Not Modified\r\n")
    } else {
        format!("HTTP/1.1 {} Canned\r\n", response.status)
    };
    if let Some(etag) = &response.etag {
        head.push_str(&format!("ETag: {etag}\r\n"));
    }
    if not_modified {
        head.push_str("Connection: close\r\n\r\n");
        stream.write_all(head.as_bytes()).await?;
        return Ok(());
    }

    head.push_str(&format!("Content-Type: {}\r\n", response.content_type));
    head.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
    head.push_str("Connection: close\r\n\r\n");
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&response.body).await?;
    stream.flush().await?;
    Ok(())
}

/// Notifier that records everything it is asked to deliver.
#[derive(Default)]
pub struct RecordingNotifier {
    pub cycle_summaries: Mutex<Vec<CycleSummary>>,
    pub interrupts: Mutex<Vec<InterruptInfo>>,
    pub change_batches: Mutex<Vec<Vec<FileChangeInfo>>>,
    pub error_batches: Mutex<Vec<Vec<FetchErrorInfo>>>,
}

impl RecordingNotifier {
    pub fn changes(&self) -> Vec<FileChangeInfo> {
        self.change_batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn errors(&self) -> Vec<FetchErrorInfo> {
        self.error_batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn summaries(&self) -> Vec<CycleSummary> {
        self.cycle_summaries.lock().unwrap().clone()
    }

    pub fn interrupt_count(&self) -> usize {
        self.interrupts.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_cycle_complete(&self, summary: &CycleSummary) -> anyhow::Result<()> {
        self.cycle_summaries.lock().unwrap().push(summary.clone());
        Ok(())
    }

    async fn send_monitor_interrupt(&self, info: &InterruptInfo) -> anyhow::Result<()> {
        self.interrupts.lock().unwrap().push(info.clone());
        Ok(())
    }

    async fn send_aggregated_file_changes(
        &self,
        changes: &[FileChangeInfo],
        _report_path: Option<&str>,
    ) -> anyhow::Result<()> {
        self.change_batches.lock().unwrap().push(changes.to_vec());
        Ok(())
    }

    async fn send_aggregated_fetch_errors(&self, errors: &[FetchErrorInfo]) -> anyhow::Result<()> {
        self.error_batches.lock().unwrap().push(errors.to_vec());
        Ok(())
    }
}

/// Reporter that fabricates stable report paths instead of rendering HTML.
#[derive(Default)]
pub struct RecordingReporter {
    pub single_reports: Mutex<Vec<String>>,
}

#[async_trait]
impl HtmlDiffReporter for RecordingReporter {
    async fn generate_diff_report(
        &self,
        _urls: &[String],
        cycle_id: &str,
    ) -> anyhow::Result<Vec<String>> {
        Ok(vec![format!("/reports/{cycle_id}/index.html")])
    }

    async fn generate_single_diff_report(
        &self,
        url: &str,
        _diff: &DiffResult,
        _old_hash: &str,
        new_hash: &str,
        _content: &[u8],
    ) -> anyhow::Result<String> {
        let slug = url.replace(['/', ':'], "_");
        let path = format!("/reports/single/{slug}-{new_hash}.html");
        self.single_reports.lock().unwrap().push(path.clone());
        Ok(path)
    }
}

/// Install a subscriber once so failing tests carry engine logs.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
