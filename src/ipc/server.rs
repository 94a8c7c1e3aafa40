//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! session events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::controller::Command;
use crate::events::SessionEvent;
use crate::session::UiState;

use super::protocol::{DaemonStatus, Notification, Request, Response};

const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    context: Arc<ClientContext>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Shared by every client handler
struct ClientContext {
    start_time: Instant,
    commands: mpsc::Sender<Command>,
    ui_rx: watch::Receiver<UiState>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Server {
    /// Create a new IPC server bound to `socket_path`
    pub fn new(
        socket_path: &Path,
        commands: mpsc::Sender<Command>,
        ui_rx: watch::Receiver<UiState>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            context: Arc::new(ClientContext {
                start_time: Instant::now(),
                commands,
                ui_rx,
                event_tx,
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = Arc::clone(&self.context);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, context) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Handle a single client connection
///
/// Responses and notifications share one writer task so pushes never
/// interleave with a response frame.
async fn handle_client(stream: UnixStream, context: Arc<ClientContext>) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(32);

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            write_frame(&mut writer, &frame).await?;
        }
        Ok::<_, anyhow::Error>(())
    });

    let mut forwarder: Option<JoinHandle<()>> = None;
    let result = read_requests(&mut reader, &context, &out_tx, &mut forwarder).await;

    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    drop(out_tx);
    match writer_task.await {
        Ok(Err(e)) => debug!(?e, "client writer stopped"),
        Err(e) => debug!(?e, "client writer task failed"),
        Ok(Ok(())) => {}
    }

    result
}

async fn read_requests<R>(
    reader: &mut R,
    context: &Arc<ClientContext>,
    out_tx: &mpsc::Sender<Vec<u8>>,
    forwarder: &mut Option<JoinHandle<()>>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let Some(msg_buf) = read_frame(reader).await? else {
            debug!("client disconnected");
            return Ok(());
        };

        // Parse request
        let request: Request = serde_json::from_slice(&msg_buf).context("failed to parse request")?;

        debug!(?request, "received request");

        let subscribe = matches!(request, Request::Subscribe);
        let response = process_request(request, context).await;

        if out_tx.send(encode(&response)?).await.is_err() {
            return Ok(());
        }

        if subscribe && forwarder.is_none() {
            debug!("client subscribed to notifications");
            *forwarder = Some(spawn_forwarder(context, out_tx.clone()));
        }
    }
}

/// Process a request and return a response
async fn process_request(request: Request, context: &ClientContext) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::GetStatus => {
            let (reply, reply_rx) = oneshot::channel();
            if context.commands.send(Command::Status { reply }).await.is_err() {
                return controller_gone();
            }
            let Ok(controller) = reply_rx.await else {
                return controller_gone();
            };

            let mut status = DaemonStatus::default().with_ui(&controller.ui);
            status.permission = controller.permission;
            status.engine_available = controller.engine_available;
            status.session = controller.session.map(|(_, status)| status);
            status.last_notice = controller.last_notice;
            status.uptime_secs = context.start_time.elapsed().as_secs();
            Response::Status(status)
        }

        Request::Start => {
            let (reply, reply_rx) = oneshot::channel();
            if context.commands.send(Command::Start { reply }).await.is_err() {
                return controller_gone();
            }
            match reply_rx.await {
                Ok(Ok(session_id)) => Response::Started { session_id },
                Ok(Err(e)) => Response::Rejected {
                    code: e.code().to_string(),
                    message: e.to_string(),
                },
                Err(_) => controller_gone(),
            }
        }

        Request::Subscribe => Response::Subscribed,
    }
}

/// Push session events and UI changes to one subscribed client
fn spawn_forwarder(context: &ClientContext, out_tx: mpsc::Sender<Vec<u8>>) -> JoinHandle<()> {
    let mut event_rx = context.event_tx.subscribe();
    let mut ui_rx = context.ui_rx.clone();
    ui_rx.mark_unchanged();

    tokio::spawn(async move {
        loop {
            let notification = tokio::select! {
                event = event_rx.recv() => match event {
                    Ok(event) => Notification::Session { event },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "session event receiver lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = ui_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = ui_rx.borrow_and_update().clone();
                    Notification::UiChanged { state }
                }
            };

            let frame = match encode(&notification) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(?e, "failed to encode notification");
                    continue;
                }
            };
            if out_tx.send(frame).await.is_err() {
                break;
            }
        }
    })
}

fn controller_gone() -> Response {
    Response::Error {
        code: "unavailable".to_string(),
        message: "controller is not running".to_string(),
    }
}

fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(msg)?)
}

/// Read one length-prefixed frame; `None` on clean EOF
async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    // Read message length (4-byte little-endian)
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("message too large: {} bytes", len);
    }

    // Read message body
    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(msg_buf))
}

/// Write a length-prefixed frame
async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = (frame.len() as u32).to_le_bytes();
    writer.write_all(&len).await?;
    writer.write_all(frame).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerStatus, StartError};
    use crate::permission::PermissionState;
    use crate::session::SessionId;

    fn context() -> (ClientContext, mpsc::Receiver<Command>, watch::Sender<UiState>) {
        let (commands, command_rx) = mpsc::channel(4);
        let (ui_tx, ui_rx) = watch::channel(UiState::default());
        let (event_tx, _) = broadcast::channel(16);
        let context = ClientContext {
            start_time: Instant::now(),
            commands,
            ui_rx,
            event_tx,
        };
        (context, command_rx, ui_tx)
    }

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, br#"{"type":"ping"}"#).await.unwrap();

        let mut reader = &buf[..];
        let frame = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(frame, br#"{"type":"ping"}"#);
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let buf = ((MAX_MESSAGE_LEN + 1) as u32).to_le_bytes();
        let mut reader = &buf[..];
        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_start_forwards_to_controller() {
        let (context, mut command_rx, _ui_tx) = context();

        let controller = tokio::spawn(async move {
            match command_rx.recv().await {
                Some(Command::Start { reply }) => {
                    let _ = reply.send(Ok(SessionId(9)));
                }
                other => panic!("unexpected command {:?}", other),
            }
        });

        let response = process_request(Request::Start, &context).await;
        assert!(matches!(response, Response::Started { session_id } if session_id == SessionId(9)));
        controller.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_start_carries_code() {
        let (context, mut command_rx, _ui_tx) = context();

        tokio::spawn(async move {
            if let Some(Command::Start { reply }) = command_rx.recv().await {
                let _ = reply.send(Err(StartError::PermissionDenied));
            }
        });

        match process_request(Request::Start, &context).await {
            Response::Rejected { code, .. } => assert_eq!(code, "permission_denied"),
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_reports_controller_snapshot() {
        let (context, mut command_rx, _ui_tx) = context();

        tokio::spawn(async move {
            if let Some(Command::Status { reply }) = command_rx.recv().await {
                let _ = reply.send(ControllerStatus {
                    permission: PermissionState::Denied,
                    engine_available: false,
                    session: None,
                    ui: UiState {
                        in_progress: false,
                        transcript: "hello world".to_string(),
                    },
                    last_notice: Some("Insufficient permissions error".to_string()),
                });
            }
        });

        match process_request(Request::GetStatus, &context).await {
            Response::Status(status) => {
                assert_eq!(status.transcript, "hello world");
                assert!(!status.in_progress);
                assert_eq!(status.permission, PermissionState::Denied);
                assert!(!status.engine_available);
                assert_eq!(
                    status.last_notice.as_deref(),
                    Some("Insufficient permissions error")
                );
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_controller_gone() {
        let (context, command_rx, _ui_tx) = context();
        drop(command_rx);

        let response = process_request(Request::Start, &context).await;
        assert!(matches!(response, Response::Error { .. }));
    }

    #[tokio::test]
    async fn test_forwarder_pushes_events() {
        let (context, _command_rx, _ui_tx) = context();
        let (out_tx, mut out_rx) = mpsc::channel(4);

        let forwarder = spawn_forwarder(&context, out_tx);
        context
            .event_tx
            .send(SessionEvent::Notice {
                message: "Network error".to_string(),
            })
            .unwrap();

        let frame = out_rx.recv().await.unwrap();
        let json = String::from_utf8(frame).unwrap();
        assert!(json.contains("Network error"));
        forwarder.abort();
    }
}
