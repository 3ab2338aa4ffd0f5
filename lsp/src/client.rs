//! Client handle — owns one language-server process and its LSP lifecycle.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::codec::{MessageReader, MessageWriter};
use crate::protocol::{self, Notification, Request};
use crate::types::{ClientError, DefLocation, Language, language_id_for};

/// Budget for the initialize handshake.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Budget per hover/definition request. Replaces the fixed poll-attempt
/// count of a synchronous read loop; a response that misses the window is
/// "no result", not a fatal error.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

const WRITER_CHANNEL_CAPACITY: usize = 64;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>>;

enum WriterCommand {
    Send(serde_json::Value),
    Shutdown,
}

enum Incoming {
    Response { id: u64, body: serde_json::Value },
    ServerRequest { id: serde_json::Value, method: String },
    Notification { method: String },
}

fn classify(frame: &serde_json::Value) -> Option<Incoming> {
    let id = frame.get("id");
    let method = frame
        .get("method")
        .and_then(|m| m.as_str())
        .map(String::from);
    let has_result_or_error = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, has_result_or_error) {
        (Some(id), None, true) => Some(Incoming::Response {
            id: id.as_u64()?,
            body: frame.clone(),
        }),
        (Some(id), Some(method), _) => Some(Incoming::ServerRequest {
            id: id.clone(),
            method,
        }),
        (None, Some(method), _) => Some(Incoming::Notification { method }),
        _ => None,
    }
}

/// One language-server connection, scoped to a (project, language) pair.
///
/// Construction is initialization: a `LspClient` value exists only after a
/// successful spawn and initialize handshake. Stopping consumes the value.
#[derive(Debug)]
pub struct LspClient {
    project_dir: PathBuf,
    language: Language,
    child: Child,
    writer_tx: mpsc::Sender<WriterCommand>,
    next_id: AtomicU64,
    pending: PendingMap,
    /// Documents a didOpen was sent for; later syncs become didChange.
    opened_docs: HashSet<String>,
    doc_versions: HashMap<String, i32>,
    #[allow(dead_code)]
    reader_handle: tokio::task::JoinHandle<()>,
    #[allow(dead_code)]
    writer_handle: tokio::task::JoinHandle<()>,
}

impl LspClient {
    /// Spawn the configured server for `language` rooted at `project_dir`
    /// and run the initialize handshake.
    pub async fn start(project_dir: &Path, language: Language) -> Result<Self, ClientError> {
        let spec = language.server_spec();

        if let Some(check_file) = spec.check_file {
            if !project_dir.join(check_file).exists() {
                return Err(ClientError::MissingCheckFile {
                    file: check_file,
                    project: project_dir.to_path_buf(),
                });
            }
        }

        let resolved = which::which(spec.command).map_err(|_| ClientError::ServerNotFound {
            command: spec.command,
        })?;

        let mut cmd = Command::new(&resolved);
        cmd.args(spec.args);
        // clangd wants to be pointed at the compilation database explicitly.
        if matches!(language, Language::C | Language::Cpp)
            && project_dir.join("compile_commands.json").exists()
        {
            cmd.arg(format!("--compile-commands-dir={}", project_dir.display()));
        }
        cmd.current_dir(project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take().ok_or(ClientError::ProcessUnavailable)?;
        let stdout = child.stdout.take().ok_or(ClientError::ProcessUnavailable)?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(async move {
            let mut writer = MessageWriter::new(stdin);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(msg) => {
                        if let Err(e) = writer.write_message(&msg).await {
                            tracing::warn!("language server write error: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_writer_tx = writer_tx.clone();
        let server_name = spec.command;
        let reader_handle = tokio::spawn(async move {
            let mut reader = MessageReader::new(stdout);
            loop {
                match reader.read_message().await {
                    Ok(Some(frame)) => {
                        Self::dispatch(&frame, &reader_pending, &reader_writer_tx, server_name)
                            .await;
                    }
                    Ok(None) => {
                        tracing::debug!("'{server_name}' closed stdout");
                        break;
                    }
                    Err(e) => {
                        // A malformed frame means the stream is unsynchronized;
                        // stop reading and let pending requests time out.
                        tracing::warn!("'{server_name}' read error: {e}");
                        break;
                    }
                }
            }
        });

        let mut client = Self {
            project_dir: project_dir.to_path_buf(),
            language,
            child,
            writer_tx,
            next_id: AtomicU64::new(1),
            pending,
            opened_docs: HashSet::new(),
            doc_versions: HashMap::new(),
            reader_handle,
            writer_handle,
        };

        client.initialize().await?;
        tracing::debug!(
            server = server_name,
            project = %client.project_dir.display(),
            "language server initialized"
        );

        Ok(client)
    }

    async fn dispatch(
        frame: &serde_json::Value,
        pending: &Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
        writer_tx: &mpsc::Sender<WriterCommand>,
        server_name: &str,
    ) {
        let Some(incoming) = classify(frame) else {
            tracing::trace!("ignoring malformed frame from '{server_name}'");
            return;
        };

        match incoming {
            Incoming::Response { id, body } => {
                // Responses for unknown ids (e.g. after a timeout) are dropped.
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(body);
                }
            }
            Incoming::ServerRequest { id, method } => {
                // Servers send client/registerCapability, workspace/configuration
                // and the like; they may block until answered.
                tracing::trace!("'{server_name}' request '{method}': replying method not found");
                let response = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": -32601,
                        "message": format!("Method not found: {method}")
                    }
                });
                let _ = writer_tx.send(WriterCommand::Send(response)).await;
            }
            Incoming::Notification { method } => {
                tracing::trace!("ignoring notification from '{server_name}': {method}");
            }
        }
    }

    async fn initialize(&mut self) -> Result<(), ClientError> {
        let root_uri = protocol::path_to_file_uri(&self.project_dir)
            .ok_or(ClientError::ProcessUnavailable)?;

        let params = protocol::initialize_params(root_uri.as_str());
        let response = self
            .send_request("initialize", Some(params), INIT_TIMEOUT)
            .await?;

        if let Some(error) = response.get("error") {
            return Err(ClientError::Malformed(format!(
                "initialize failed: {}",
                error["message"].as_str().unwrap_or("unknown error")
            )));
        }

        self.send_notification("initialized", Some(serde_json::json!({})))
            .await
    }

    async fn send_request(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = Request::new(id, method, params);
        let frame = serde_json::to_value(&request)
            .map_err(|e| ClientError::Malformed(e.to_string()))?;
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(ClientError::ProcessUnavailable);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                // Reader task gone means the process side is dead.
                self.pending.lock().await.remove(&id);
                Err(ClientError::ServerDied)
            }
            Err(_) => {
                // Drop the entry so repeated timeouts don't grow the map.
                self.pending.lock().await.remove(&id);
                Err(ClientError::Timeout(timeout))
            }
        }
    }

    async fn send_notification(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<(), ClientError> {
        let notification = Notification::new(method, params);
        let frame = serde_json::to_value(&notification)
            .map_err(|e| ClientError::Malformed(e.to_string()))?;
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| ClientError::ProcessUnavailable)
    }

    /// Whether the server process is still running.
    ///
    /// The registry drops dead clients so a crashed server is respawned on
    /// the next request instead of timing out forever from the cache.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    #[must_use]
    pub fn language(&self) -> Language {
        self.language
    }

    /// Send the file's current text to the server.
    ///
    /// Runs before every positional request: the server has no persistent
    /// knowledge of files between calls. First touch is didOpen, later
    /// touches didChange with a bumped version.
    async fn sync_file(&mut self, path: &Path) -> Result<String, ClientError> {
        let uri = protocol::path_to_file_uri(path)
            .ok_or(ClientError::ProcessUnavailable)?
            .to_string();
        let text = tokio::fs::read_to_string(path).await?;

        if self.opened_docs.contains(&uri) {
            let version = self.doc_versions.entry(uri.clone()).or_insert(1);
            *version += 1;
            let params = protocol::did_change_params(&uri, *version, &text);
            self.send_notification("textDocument/didChange", Some(params))
                .await?;
        } else {
            self.opened_docs.insert(uri.clone());
            self.doc_versions.insert(uri.clone(), 1);
            let params = protocol::did_open_params(&uri, language_id_for(path), 1, &text);
            self.send_notification("textDocument/didOpen", Some(params))
                .await?;
        }
        Ok(uri)
    }

    /// Definition location(s) for the symbol at `line`:`col` (1-based).
    pub async fn get_definition(
        &mut self,
        file: &Path,
        line: u32,
        col: u32,
    ) -> Result<Vec<DefLocation>, ClientError> {
        if !self.is_alive() {
            return Err(ClientError::ServerDied);
        }
        let uri = self.sync_file(file).await?;
        let params = protocol::position_params(&uri, line, col);
        let response = self
            .send_request("textDocument/definition", Some(params), REQUEST_TIMEOUT)
            .await?;

        if response.get("error").is_some() {
            tracing::debug!("definition request refused: {}", response["error"]);
            return Ok(Vec::new());
        }
        Ok(protocol::parse_definition_result(
            response.get("result").unwrap_or(&serde_json::Value::Null),
        ))
    }

    /// Hover text for the symbol at `line`:`col` (1-based), if any.
    pub async fn get_hover(
        &mut self,
        file: &Path,
        line: u32,
        col: u32,
    ) -> Result<Option<String>, ClientError> {
        if !self.is_alive() {
            return Err(ClientError::ServerDied);
        }
        let uri = self.sync_file(file).await?;
        let params = protocol::position_params(&uri, line, col);
        let response = self
            .send_request("textDocument/hover", Some(params), REQUEST_TIMEOUT)
            .await?;

        if response.get("error").is_some() {
            tracing::debug!("hover request refused: {}", response["error"]);
            return Ok(None);
        }
        Ok(response
            .get("result")
            .and_then(|r| r.get("contents"))
            .and_then(protocol::hover_contents_to_string))
    }

    /// Gracefully stop the server. Consumes self; a stopped client cannot
    /// be reused, it must be recreated.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.send_request("shutdown", None, SHUTDOWN_TIMEOUT).await {
            tracing::debug!("shutdown request failed: {e}");
        }
        // Sent regardless of the shutdown outcome; a server that ignored
        // the request still gets told to exit before we resort to kill.
        let _ = self.send_notification("exit", None).await;

        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait())
            .await
            .is_err()
        {
            tracing::debug!("language server did not exit in time, killing");
            let _ = self.child.kill().await;
        }
    }
}
