//! Wire format for the binary RPC surface.
//!
//! ```text
//! ┌──────────────────┬───────────────────────────────┐
//! │ length: u32 (BE) │ payload: bincode(RpcRequest)  │   client → server
//! ├──────────────────┼───────────────────────────────┤
//! │ length: u32 (BE) │ payload: bincode(RpcResponse) │   server → client
//! └──────────────────┴───────────────────────────────┘
//! ```
//!
//! One response per request, in order. Frames over the receiver's limit are
//! refused before the payload is read.

use std::fmt;
use std::io;

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::store::{StoreError, User, UserFields};

/// Calls accepted by the RPC server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcRequest {
    GetUser { id: String },
    ListUsers,
    CreateUser { fields: UserFields },
    UpdateUser { id: String, fields: UserFields },
    DeleteUser { id: String },
}

impl RpcRequest {
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::GetUser { .. } => "GetUser",
            RpcRequest::ListUsers => "ListUsers",
            RpcRequest::CreateUser { .. } => "CreateUser",
            RpcRequest::UpdateUser { .. } => "UpdateUser",
            RpcRequest::DeleteUser { .. } => "DeleteUser",
        }
    }
}

/// Status codes carried by [`RpcResponse::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcCode {
    NotFound,
    InvalidArgument,
    Internal,
}

impl RpcCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcCode::NotFound => "not_found",
            RpcCode::InvalidArgument => "invalid_argument",
            RpcCode::Internal => "internal",
        }
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replies sent by the RPC server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResponse {
    User(User),
    Users(Vec<User>),
    Deleted { success: bool },
    Error { code: RpcCode, message: String },
}

impl RpcResponse {
    pub fn error(code: RpcCode, message: impl Into<String>) -> Self {
        RpcResponse::Error {
            code,
            message: message.into(),
        }
    }

    /// Status label for metrics and logs.
    pub fn code(&self) -> &'static str {
        match self {
            RpcResponse::Error { code, .. } => code.as_str(),
            _ => "ok",
        }
    }
}

impl From<StoreError> for RpcResponse {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => RpcResponse::error(RpcCode::NotFound, "user not found"),
        }
    }
}

/// Error reading or writing a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    TooLarge { len: u32, max: u32 },
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, FrameError> {
    Ok(bincode::DefaultOptions::new().serialize(message)?)
}

/// Decode a payload. Nothing inside may claim more bytes than the payload holds.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, FrameError> {
    Ok(bincode::DefaultOptions::new()
        .with_limit(payload.len() as u64)
        .deserialize(payload)?)
}

/// Read one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R>(reader: &mut R, max_len: u32) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    // Only EOF before the first header byte is a clean close.
    let mut header = [0u8; 4];
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await?;

    let len = u32::from_be_bytes(header);
    if len > max_len {
        return Err(FrameError::TooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: u32::MAX,
        max: u32::MAX,
    })?;
    writer.write_u32(len).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_message<R, T>(reader: &mut R, max_len: u32) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader, max_len).await? {
        Some(payload) => decode(&payload).map(Some),
        None => Ok(None),
    }
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = encode(message)?;
    write_frame(writer, &payload).await
}
