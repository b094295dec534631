//! Async client for the binary RPC surface.

use tokio::io::BufReader;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::rpc::protocol::{self, FrameError, RpcCode, RpcRequest, RpcResponse};
use crate::store::{User, UserFields};

/// Largest reply the client accepts.
const MAX_RESPONSE_BYTES: u32 = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("connection closed by server")]
    Closed,
    #[error("{code}: {message}")]
    Status { code: RpcCode, message: String },
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

impl RpcError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RpcError::Status { code: RpcCode::NotFound, .. })
    }
}

/// One connection to an RPC server. Calls are sent one at a time.
pub struct RpcClient {
    stream: BufReader<TcpStream>,
}

impl RpcClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(addr).await.map_err(FrameError::from)?;
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    /// Send a request and wait for its reply. Error replies become `RpcError::Status`.
    pub async fn call(&mut self, request: &RpcRequest) -> Result<RpcResponse, RpcError> {
        protocol::write_message(self.stream.get_mut(), request).await?;
        match protocol::read_message(&mut self.stream, MAX_RESPONSE_BYTES).await? {
            Some(RpcResponse::Error { code, message }) => Err(RpcError::Status { code, message }),
            Some(response) => Ok(response),
            None => Err(RpcError::Closed),
        }
    }

    pub async fn get_user(&mut self, id: &str) -> Result<User, RpcError> {
        let request = RpcRequest::GetUser { id: id.to_string() };
        expect_user(&request, self.call(&request).await?)
    }

    pub async fn list_users(&mut self) -> Result<Vec<User>, RpcError> {
        let request = RpcRequest::ListUsers;
        match self.call(&request).await? {
            RpcResponse::Users(users) => Ok(users),
            _ => Err(RpcError::UnexpectedResponse(request.method())),
        }
    }

    pub async fn create_user(&mut self, fields: UserFields) -> Result<User, RpcError> {
        let request = RpcRequest::CreateUser { fields };
        expect_user(&request, self.call(&request).await?)
    }

    pub async fn update_user(&mut self, id: &str, fields: UserFields) -> Result<User, RpcError> {
        let request = RpcRequest::UpdateUser {
            id: id.to_string(),
            fields,
        };
        expect_user(&request, self.call(&request).await?)
    }

    /// Returns whether a user was removed.
    pub async fn delete_user(&mut self, id: &str) -> Result<bool, RpcError> {
        let request = RpcRequest::DeleteUser { id: id.to_string() };
        match self.call(&request).await? {
            RpcResponse::Deleted { success } => Ok(success),
            _ => Err(RpcError::UnexpectedResponse(request.method())),
        }
    }
}

fn expect_user(request: &RpcRequest, response: RpcResponse) -> Result<User, RpcError> {
    match response {
        RpcResponse::User(user) => Ok(user),
        _ => Err(RpcError::UnexpectedResponse(request.method())),
    }
}
