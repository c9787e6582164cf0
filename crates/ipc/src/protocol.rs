use serde::{Deserialize, Serialize};

use crate::Method;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request<P = serde_json::Value> {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<u64>,
  pub method: Method,
  #[serde(default)]
  pub params: P,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response<R = serde_json::Value> {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result: Option<R>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
  pub code: i32,
  pub message: String,
}

impl<R: Serialize> Response<R> {
  pub fn success(id: Option<u64>, result: R) -> Self {
    Self { id, result: Some(result), error: None }
  }
}

impl Response<()> {
  pub fn error(id: Option<u64>, code: i32, message: impl Into<String>) -> Self {
    Self { id, result: None, error: Some(RpcError { code, message: message.into() }) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn request_round_trips_through_json() {
    let request = Request { id: Some(1), method: Method::Status, params: serde_json::Value::Null };
    let text = serde_json::to_string(&request).unwrap();
    let back: Request = serde_json::from_str(&text).unwrap();
    assert_eq!(back.id, Some(1));
    assert_eq!(back.method, Method::Status);
  }

  #[test]
  fn error_response_omits_result_field() {
    let response = Response::<()>::error(Some(2), 503, "db down");
    let text = serde_json::to_string(&response).unwrap();
    assert!(!text.contains("\"result\""));
    assert!(text.contains("\"db down\""));
  }
}
