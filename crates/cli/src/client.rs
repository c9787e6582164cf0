//! Thin Unix-socket client for the control-plane protocol the daemon's
//! `ControlServer` speaks: one newline-delimited JSON request per line, one
//! newline-delimited JSON response back.

use std::path::{Path, PathBuf};

use aires_ipc::{Method, Request, Response};
use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LinesCodec};

pub struct Client {
  socket_path: PathBuf,
}

impl Client {
  pub fn new(socket_path: PathBuf) -> Self {
    Self { socket_path }
  }

  pub async fn call<R: DeserializeOwned>(&self, method: Method) -> Result<R> {
    self.call_with_id(method, Some(1)).await
  }

  async fn call_with_id<R: DeserializeOwned>(&self, method: Method, id: Option<u64>) -> Result<R> {
    let stream = connect(&self.socket_path).await?;
    let mut framed = Framed::new(stream, LinesCodec::new());

    let request = Request { id, method, params: serde_json::Value::Null };
    let line = serde_json::to_string(&request).context("failed to encode request")?;
    framed.send(line).await.context("failed to send request")?;

    let line = framed
      .next()
      .await
      .context("daemon closed the connection without responding")?
      .context("failed to read response line")?;
    let response: Response<R> = serde_json::from_str(&line).context("failed to decode response")?;

    if let Some(error) = response.error {
      bail!("daemon returned error {}: {}", error.code, error.message);
    }
    response.result.context("daemon response carried neither a result nor an error")
  }
}

async fn connect(socket_path: &Path) -> Result<UnixStream> {
  UnixStream::connect(socket_path)
    .await
    .with_context(|| format!("could not connect to daemon at {} (is it running?)", socket_path.display()))
}
