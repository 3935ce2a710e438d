//! Stdio transport for MCP servers.
//!
//! Owns one subprocess speaking line-delimited JSON-RPC over stdin/stdout.
//! Stderr is explicitly piped (never inherited) and fanned out through a
//! broadcast tap so callers can observe it while the process runs.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use artinet_core::error::ToolError;

const STDERR_BUF_SIZE: usize = 8 * 1024;
const STDERR_TAP_CAPACITY: usize = 64;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, ToolError>>>>>;

/// Expand shell-style variable references in an argument vector via the host
/// shell, so values like `"$HOME"` or `"%USERPROFILE%"` resolve the way they
/// would on the command line. Arguments without variable markers pass through
/// untouched, as do arguments the shell fails to expand.
pub async fn expand_args(args: &[String]) -> Vec<String> {
    let mut expanded = Vec::with_capacity(args.len());
    for arg in args {
        expanded.push(expand_arg(arg).await);
    }
    expanded
}

async fn expand_arg(arg: &str) -> String {
    if !arg.contains('$') && !arg.contains('%') {
        return arg.to_string();
    }

    let output = if cfg!(target_os = "windows") {
        Command::new("cmd")
            .args(["/C", &format!("echo {arg}")])
            .output()
            .await
    } else {
        Command::new("sh")
            .args(["-c", &format!("printf '%s' \"{arg}\"")])
            .output()
            .await
    };

    match output {
        Ok(out) if out.status.success() => {
            let value = String::from_utf8_lossy(&out.stdout);
            let value = value.trim_end_matches(['\r', '\n']);
            if value.is_empty() {
                arg.to_string()
            } else {
                value.to_string()
            }
        }
        _ => arg.to_string(),
    }
}

/// A JSON-RPC transport over one subprocess's stdio.
pub struct StdioTransport {
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    child: tokio::sync::Mutex<Option<Child>>,
    pid: Option<u32>,
    pending: Pending,
    next_id: AtomicU64,
    closed: AtomicBool,
    stderr_tx: broadcast::Sender<String>,
    stdout_task: Mutex<Option<JoinHandle<()>>>,
    stderr_task: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn the server process with stdin/stdout/stderr all piped, expanding
    /// shell variables in the argument vector first.
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, ToolError> {
        let args = expand_args(args).await;

        let mut child = Command::new(command)
            .args(&args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Spawn(format!("{command}: {e}")))?;

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolError::Spawn("stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::Spawn("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ToolError::Spawn("stderr not captured".into()))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (stderr_tx, _) = broadcast::channel(STDERR_TAP_CAPACITY);

        let stdout_task = {
            let pending = pending.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => route_line(&pending, &line),
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "Failed to read server stdout");
                            break;
                        }
                    }
                }
                // EOF: fail everything still waiting
                fail_pending(&pending);
            })
        };

        let stderr_task = {
            let tx = stderr_tx.clone();
            tokio::spawn(async move {
                let mut stderr = stderr;
                let mut buf = vec![0u8; STDERR_BUF_SIZE];
                loop {
                    match stderr.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                            let _ = tx.send(chunk);
                        }
                    }
                }
            })
        };

        debug!(command, pid, "Spawned MCP server process");

        Ok(Self {
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            child: tokio::sync::Mutex::new(Some(child)),
            pid,
            pending,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            stderr_tx,
            stdout_task: Mutex::new(Some(stdout_task)),
            stderr_task: Mutex::new(Some(stderr_task)),
        })
    }

    /// The server process id, if known.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Subscribe to raw stderr chunks from the server process.
    pub fn subscribe_stderr(&self) -> broadcast::Receiver<String> {
        self.stderr_tx.subscribe()
    }

    /// Send a request and await its response, honouring the cancellation
    /// token. A cancelled call abandons the pending entry; a late response
    /// for it is dropped by the router.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ToolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ToolError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(id, tx);
        }

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        if let Err(e) = self.write_frame(&frame).await {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(&id);
            return Err(e);
        }

        trace!(method, id, "Sent request");

        tokio::select! {
            _ = cancel.cancelled() => {
                let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                pending.remove(&id);
                Err(ToolError::Cancelled)
            }
            result = rx => result.map_err(|_| ToolError::Closed)?,
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), ToolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ToolError::Closed);
        }
        let frame = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.write_frame(&frame).await
    }

    async fn write_frame(&self, frame: &Value) -> Result<(), ToolError> {
        let mut line = frame.to_string();
        line.push('\n');

        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(ToolError::Closed)?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|_| ToolError::Closed)?;
        stdin.flush().await.map_err(|_| ToolError::Closed)?;
        Ok(())
    }

    /// Tear the transport down. Every step is isolated so a failure in one
    /// never skips the rest, and the sequence ends by force-killing the
    /// server process if its pid is known.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        // 1. Stop consuming stdout
        if let Some(task) = take_handle(&self.stdout_task) {
            task.abort();
        }

        // 2. Stop consuming stderr
        if let Some(task) = take_handle(&self.stderr_task) {
            task.abort();
        }

        // 3. Destroy stdin so the server sees EOF
        {
            let mut guard = self.stdin.lock().await;
            if let Some(mut stdin) = guard.take() {
                let _ = stdin.shutdown().await;
            }
        }

        // 4. Fail everything still waiting on a response
        fail_pending(&self.pending);

        // 5. Force-kill the server process and reap it off-path
        {
            let mut guard = self.child.lock().await;
            if let Some(mut child) = guard.take() {
                let _ = child.start_kill();
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
        }

        debug!(pid = self.pid, "Closed stdio transport");
    }
}

fn take_handle(slot: &Mutex<Option<JoinHandle<()>>>) -> Option<JoinHandle<()>> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take()
}

fn fail_pending(pending: &Pending) {
    let drained: Vec<_> = {
        let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.drain().collect()
    };
    for (_, tx) in drained {
        let _ = tx.send(Err(ToolError::Closed));
    }
}

fn route_line(pending: &Pending, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let frame: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            trace!(error = %e, "Ignoring unparseable server output line");
            return;
        }
    };

    let Some(id) = frame.get("id").and_then(Value::as_u64) else {
        // Server-initiated notification; nothing routes it
        trace!(method = frame["method"].as_str(), "Ignoring server notification");
        return;
    };

    let sender = {
        let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(&id)
    };
    let Some(sender) = sender else {
        trace!(id, "Dropping response with no pending request");
        return;
    };

    let result = if let Some(error) = frame.get("error") {
        let code = error["code"].as_i64().unwrap_or(0);
        let message = error["message"].as_str().unwrap_or("unknown error");
        Err(ToolError::Rpc(format!("{code}: {message}")))
    } else {
        Ok(frame.get("result").cloned().unwrap_or(Value::Null))
    };

    let _ = sender.send(result);
}
