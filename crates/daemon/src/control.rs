//! Control server: a Unix-socket RPC surface answering the 7 control-plane
//! methods, one newline-delimited JSON request per line.

use std::path::PathBuf;
use std::sync::Arc;

use aires_core::Result as AiresResult;
use aires_ipc::{Method, Request, Response, RpcError, ShutdownResult};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, info, warn};

use crate::status::DaemonStatus;

pub struct ControlServer {
  socket_path: PathBuf,
  status: Arc<DaemonStatus>,
  shutdown_tx: watch::Sender<bool>,
}

impl ControlServer {
  pub fn new(socket_path: PathBuf, status: Arc<DaemonStatus>, shutdown_tx: watch::Sender<bool>) -> Self {
    Self { socket_path, status, shutdown_tx }
  }

  pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> AiresResult<()> {
    if self.socket_path.exists() {
      tokio::fs::remove_file(&self.socket_path).await.map_err(aires_core::AiresError::Io)?;
    }
    if let Some(parent) = self.socket_path.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(aires_core::AiresError::Io)?;
    }

    let listener = UnixListener::bind(&self.socket_path).map_err(aires_core::AiresError::Io)?;
    info!(socket = %self.socket_path.display(), "control server listening");

    loop {
      tokio::select! {
        accepted = listener.accept() => {
          match accepted {
            Ok((stream, _)) => {
              let status = self.status.clone();
              let shutdown_tx = self.shutdown_tx.clone();
              tokio::spawn(handle_connection(stream, status, shutdown_tx));
            }
            Err(e) => error!("control server accept error: {e}"),
          }
        }
        _ = shutdown.changed() => {
          if *shutdown.borrow() {
            break;
          }
        }
      }
    }

    if self.socket_path.exists() {
      let _ = tokio::fs::remove_file(&self.socket_path).await;
    }
    info!("control server stopped");
    Ok(())
  }
}

async fn handle_connection(stream: UnixStream, status: Arc<DaemonStatus>, shutdown_tx: watch::Sender<bool>) {
  debug!("control client connected");
  let framed = Framed::new(stream, LinesCodec::new());
  let (mut sink, mut stream) = framed.split();

  while let Some(result) = stream.next().await {
    let line = match result {
      Ok(line) => line,
      Err(e) => {
        warn!("control connection read error: {e}");
        break;
      }
    };
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    let request: Request = match serde_json::from_str(trimmed) {
      Ok(request) => request,
      Err(e) => {
        let response = Response::<()>::error(None, -32700, format!("parse error: {e}"));
        if let Ok(json) = serde_json::to_string(&response) {
          let _ = sink.send(json).await;
        }
        continue;
      }
    };

    let response = dispatch(&status, &shutdown_tx, request).await;
    match serde_json::to_string(&response) {
      Ok(json) => {
        if sink.send(json).await.is_err() {
          break;
        }
      }
      Err(e) => error!("failed to serialize control response: {e}"),
    }
  }
}

async fn dispatch(status: &Arc<DaemonStatus>, shutdown_tx: &watch::Sender<bool>, request: Request) -> Response<serde_json::Value> {
  let id = request.id;
  match request.method {
    Method::Ping => to_response(id, status.ping().await),
    Method::Status => to_response(id, status.status().await),
    Method::Health => to_response(id, status.health().await),
    Method::Metrics => to_response(id, status.metrics().await),
    Method::Drain => to_response(id, Ok(status.drain())),
    Method::Reload => to_response(id, status.reload().await),
    Method::Shutdown => {
      let _ = shutdown_tx.send(true);
      to_response(id, Ok(ShutdownResult { message: "shutdown initiated".to_string() }))
    }
  }
}

fn to_response<T: Serialize>(id: Option<u64>, result: AiresResult<T>) -> Response<serde_json::Value> {
  match result {
    Ok(value) => match serde_json::to_value(value) {
      Ok(value) => Response::success(id, value),
      Err(e) => error_response(id, -32603, format!("failed to serialize result: {e}")),
    },
    Err(e) => error_response(id, -32000, e.to_string()),
  }
}

fn error_response(id: Option<u64>, code: i32, message: impl Into<String>) -> Response<serde_json::Value> {
  Response { id, result: None, error: Some(RpcError { code, message: message.into() }) }
}
