//! Binary RPC server.
//!
//! # Responsibilities
//! - Bounded accept loop, one task per connection
//! - Decode each frame, make one store call, encode the reply
//! - On shutdown: stop accepting, let every connection finish the request it
//!   is serving, then close at a frame boundary

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

use crate::config::RpcConfig;
use crate::lifecycle::{Listener, ShutdownSignal};
use crate::net::{self, BoundedListener, ConnectionPermit, ListenerError};
use crate::observability::metrics;
use crate::rpc::protocol::{self, FrameError, RpcCode, RpcRequest, RpcResponse};
use crate::store::UserStore;

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// RPC listener bound to the shared store.
pub struct RpcServer {
    listener: BoundedListener,
    store: Arc<dyn UserStore>,
    max_frame_bytes: u32,
    local_addr: SocketAddr,
}

impl RpcServer {
    pub const NAME: &'static str = "rpc";

    pub async fn bind(config: &RpcConfig, store: Arc<dyn UserStore>) -> Result<Self, ListenerError> {
        let listener = BoundedListener::new(
            net::bind(Self::NAME, &config.bind_address).await?,
            config.max_connections,
        );
        let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
            listener: Self::NAME,
            address: config.bind_address.clone(),
            source,
        })?;

        Ok(Self {
            listener,
            store,
            max_frame_bytes: config.max_frame_bytes,
            local_addr,
        })
    }

    async fn run(self, mut shutdown: ShutdownSignal) -> std::io::Result<()> {
        let RpcServer {
            listener,
            store,
            max_frame_bytes,
            local_addr,
        } = self;
        tracing::info!(
            address = %local_addr,
            max_connections = listener.max_connections(),
            "RPC server starting"
        );

        // Dropping the set (e.g. when a forced stop aborts this task) aborts every connection.
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let span = tracing::debug_span!("rpc_connection", peer = %peer);
                        let connection = Connection {
                            store: Arc::clone(&store),
                            max_frame_bytes,
                            shutdown: shutdown.clone(),
                            _permit: permit,
                        };
                        connections.spawn(connection.serve(stream).instrument(span));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_join_result(joined);
                }
            }
        }

        // Stop accepting before waiting on in-flight work.
        drop(listener);
        tracing::info!(
            active_connections = connections.len(),
            "RPC server draining connections"
        );
        while let Some(joined) = connections.join_next().await {
            log_join_result(joined);
        }

        tracing::info!("RPC server stopped");
        Ok(())
    }
}

impl Listener for RpcServer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn serve(self: Box<Self>, shutdown: ShutdownSignal) -> BoxFuture<'static, std::io::Result<()>> {
        Box::pin(self.run(shutdown))
    }
}

fn log_join_result(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "RPC connection task panicked");
        }
    }
}

struct Connection {
    store: Arc<dyn UserStore>,
    max_frame_bytes: u32,
    shutdown: ShutdownSignal,
    _permit: ConnectionPermit,
}

impl Connection {
    async fn serve(mut self, stream: TcpStream) {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        loop {
            // Shutdown is only observed between requests; a request already
            // read is always answered.
            let frame = tokio::select! {
                biased;
                _ = self.shutdown.recv() => {
                    tracing::debug!("Closing connection for shutdown");
                    break;
                }
                frame = protocol::read_frame(&mut reader, self.max_frame_bytes) => frame,
            };

            let payload = match frame {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(e @ FrameError::TooLarge { .. }) => {
                    tracing::warn!(error = %e, "Rejecting oversized frame");
                    let reply = RpcResponse::error(RpcCode::InvalidArgument, e.to_string());
                    let _ = protocol::write_message(&mut writer, &reply).await;
                    break;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Connection read failed");
                    break;
                }
            };

            let response = match protocol::decode::<RpcRequest>(&payload) {
                Ok(request) => dispatch(self.store.as_ref(), request),
                Err(e) => RpcResponse::error(RpcCode::InvalidArgument, format!("malformed request: {e}")),
            };

            if let Err(e) = protocol::write_message(&mut writer, &response).await {
                tracing::debug!(error = %e, "Connection write failed");
                break;
            }
        }
    }
}

/// Run one request against the store.
pub fn dispatch(store: &dyn UserStore, request: RpcRequest) -> RpcResponse {
    let start = Instant::now();
    let method = request.method();

    let response = match request {
        RpcRequest::GetUser { id } => store
            .get(&id)
            .map_or_else(RpcResponse::from, RpcResponse::User),
        RpcRequest::ListUsers => RpcResponse::Users(store.list()),
        RpcRequest::CreateUser { fields } => {
            let user = store.create(fields);
            tracing::info!(user_id = %user.id, "User created via RPC");
            RpcResponse::User(user)
        }
        RpcRequest::UpdateUser { id, fields } => store
            .update(&id, fields)
            .map_or_else(RpcResponse::from, RpcResponse::User),
        RpcRequest::DeleteUser { id } => RpcResponse::Deleted {
            success: store.delete(&id),
        },
    };

    metrics::record_rpc_call(method, response.code(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use crate::rpc::client::{RpcClient, RpcError};
    use crate::store::{InMemoryUserStore, StoreError, User, UserFields};
    use tokio::io::AsyncWriteExt;

    fn test_config() -> RpcConfig {
        RpcConfig {
            bind_address: "127.0.0.1:0".into(),
            max_connections: 8,
            max_frame_bytes: 1024,
        }
    }

    async fn start() -> (SocketAddr, Shutdown, tokio::task::JoinHandle<std::io::Result<()>>) {
        start_with(Arc::new(InMemoryUserStore::new())).await
    }

    async fn start_with(
        store: Arc<dyn UserStore>,
    ) -> (SocketAddr, Shutdown, tokio::task::JoinHandle<std::io::Result<()>>) {
        let server = RpcServer::bind(&test_config(), store).await.unwrap();
        let addr = server.local_addr;
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(Box::new(server).serve(shutdown.subscribe()));
        (addr, shutdown, handle)
    }

    fn ann() -> UserFields {
        UserFields {
            name: "Ann".into(),
            email: "ann@x.io".into(),
            age: 30,
        }
    }

    #[test]
    fn dispatch_maps_store_results() {
        let store = InMemoryUserStore::new();

        let created = match dispatch(&store, RpcRequest::CreateUser { fields: ann() }) {
            RpcResponse::User(user) => user,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(
            dispatch(&store, RpcRequest::GetUser { id: created.id.clone() }),
            RpcResponse::User(created.clone())
        );
        assert_eq!(
            dispatch(&store, RpcRequest::DeleteUser { id: created.id.clone() }),
            RpcResponse::Deleted { success: true }
        );
        assert_eq!(
            dispatch(&store, RpcRequest::DeleteUser { id: created.id.clone() }),
            RpcResponse::Deleted { success: false }
        );
        assert_eq!(
            dispatch(&store, RpcRequest::GetUser { id: created.id }).code(),
            "not_found"
        );
    }

    #[tokio::test]
    async fn serves_calls_over_tcp() {
        let (addr, shutdown, handle) = start().await;
        let mut client = RpcClient::connect(addr).await.unwrap();

        let user = client.create_user(ann()).await.unwrap();
        assert_eq!(client.get_user(&user.id).await.unwrap(), user);
        assert_eq!(client.list_users().await.unwrap(), vec![user.clone()]);
        assert!(client.delete_user(&user.id).await.unwrap());
        assert!(client.get_user(&user.id).await.unwrap_err().is_not_found());

        shutdown.trigger();
        handle.await.unwrap().unwrap();
    }

    /// Store whose `get` panics; every other call works.
    struct PanickingStore(InMemoryUserStore);

    impl UserStore for PanickingStore {
        fn create(&self, fields: UserFields) -> User {
            self.0.create(fields)
        }

        fn get(&self, _id: &str) -> Result<User, StoreError> {
            panic!("store failure")
        }

        fn list(&self) -> Vec<User> {
            self.0.list()
        }

        fn update(&self, id: &str, fields: UserFields) -> Result<User, StoreError> {
            self.0.update(id, fields)
        }

        fn delete(&self, id: &str) -> bool {
            self.0.delete(id)
        }
    }

    #[tokio::test]
    async fn handler_panic_closes_only_its_connection() {
        let (addr, shutdown, handle) =
            start_with(Arc::new(PanickingStore(InMemoryUserStore::new()))).await;

        let mut bystander = RpcClient::connect(addr).await.unwrap();
        assert!(bystander.list_users().await.unwrap().is_empty());

        let mut failing = RpcClient::connect(addr).await.unwrap();
        assert!(matches!(failing.get_user("u1").await, Err(RpcError::Closed)));

        // The other open connection and new connections keep working.
        let user = bystander.create_user(ann()).await.unwrap();
        assert_eq!(bystander.list_users().await.unwrap(), vec![user.clone()]);
        let mut fresh = RpcClient::connect(addr).await.unwrap();
        assert_eq!(fresh.list_users().await.unwrap(), vec![user]);

        drop((bystander, failing, fresh));
        shutdown.trigger();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_request_keeps_connection_usable() {
        let (addr, shutdown, handle) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        protocol::write_frame(&mut stream, &[0xff, 0x00]).await.unwrap();
        let reply: RpcResponse = protocol::read_message(&mut stream, 1024).await.unwrap().unwrap();
        assert_eq!(reply.code(), "invalid_argument");

        protocol::write_message(&mut stream, &RpcRequest::ListUsers).await.unwrap();
        let reply: RpcResponse = protocol::read_message(&mut stream, 1024).await.unwrap().unwrap();
        assert_eq!(reply, RpcResponse::Users(Vec::new()));

        shutdown.trigger();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn oversized_frame_closes_connection() {
        let (addr, shutdown, handle) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_u32(1_000_000).await.unwrap();
        let reply: RpcResponse = protocol::read_message(&mut stream, 1024).await.unwrap().unwrap();
        assert_eq!(reply.code(), "invalid_argument");
        let next: Option<RpcResponse> = protocol::read_message(&mut stream, 1024).await.unwrap();
        assert!(next.is_none());

        shutdown.trigger();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn idle_connections_close_on_shutdown() {
        let (addr, shutdown, handle) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        // Make sure the connection is accepted before shutting down.
        protocol::write_message(&mut stream, &RpcRequest::ListUsers).await.unwrap();
        let _: RpcResponse = protocol::read_message(&mut stream, 1024).await.unwrap().unwrap();

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("server should stop promptly")
            .unwrap()
            .unwrap();

        let next: Option<RpcResponse> = protocol::read_message(&mut stream, 1024).await.unwrap();
        assert!(next.is_none());
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
