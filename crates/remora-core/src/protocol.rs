//! Wire protocol types and framing.
//!
//! Every message is a 4-byte big-endian length prefix followed by a UTF-8
//! JSON payload.
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```

use crate::{RemotingError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// A call addressed to one method of one exported service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Correlation id echoed back in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub service: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl InvocationRequest {
    pub fn new(service: impl Into<String>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: None,
            service: service.into(),
            method: method.into(),
            args,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

/// Outcome of one call. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResponse {
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
}

impl InvocationResponse {
    /// Create a success response.
    pub fn success(id: Option<u64>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create a failure response.
    pub fn failure(id: Option<u64>, failure: Failure) -> Self {
        Self {
            id,
            result: None,
            error: Some(failure),
        }
    }

    /// Create a failure response from an error.
    pub fn from_error(id: Option<u64>, err: &RemotingError) -> Self {
        Self::failure(id, err.to_failure())
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Kind of the carried failure, if any.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|f| f.kind)
    }
}

/// Structured failure returned to callers instead of a dropped connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    UnknownService,
    UnknownMethod,
    ArgumentMismatch,
    Protocol,
    Application,
    Timeout,
    Internal,
}

/// Decode a request payload.
///
/// Any undecodable payload (bad UTF-8, bad JSON, missing fields) is a
/// `Protocol` error.
pub fn decode_request(payload: &[u8]) -> Result<InvocationRequest> {
    serde_json::from_slice(payload).map_err(|e| RemotingError::Protocol {
        message: format!("Undecodable request: {}", e),
    })
}

pub fn encode_request(request: &InvocationRequest) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(request)?)
}

pub fn decode_response(payload: &[u8]) -> Result<InvocationResponse> {
    serde_json::from_slice(payload).map_err(|e| RemotingError::Protocol {
        message: format!("Undecodable response: {}", e),
    })
}

pub fn encode_response(response: &InvocationResponse) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(response)?)
}

const INITIAL_BODY_CAPACITY: usize = 8 * 1024;

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed connection). The body buffer grows
/// with the bytes actually received, not with the announced length.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > max_frame_size {
        return Err(RemotingError::Protocol {
            message: format!(
                "Frame size {} exceeds maximum {}",
                len, max_frame_size
            ),
        });
    }

    let mut payload = Vec::with_capacity(len.min(INITIAL_BODY_CAPACITY));
    (&mut *reader).take(len as u64).read_to_end(&mut payload).await?;

    if payload.len() < len {
        return Err(RemotingError::Protocol {
            message: format!(
                "Truncated frame: expected {} bytes, got {}",
                len,
                payload.len()
            ),
        });
    }

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| RemotingError::Protocol {
        message: format!("Payload of {} bytes cannot be framed", payload.len()),
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
