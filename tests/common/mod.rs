//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use user_service::config::ServiceConfig;
use user_service::lifecycle::{self, Shutdown, ShutdownReport};
use user_service::store::{InMemoryUserStore, StoreError, User, UserFields, UserStore};
use user_service::{HttpServer, RpcServer};

/// Config with both listeners on ephemeral loopback ports.
pub fn test_config(drain_timeout_secs: u64) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.http.bind_address = "127.0.0.1:0".into();
    config.rpc.bind_address = "127.0.0.1:0".into();
    config.shutdown.drain_timeout_secs = drain_timeout_secs;
    config
}

/// A running service plus the handles a test needs to talk to and stop it.
pub struct TestService {
    pub http_addr: SocketAddr,
    pub rpc_addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<ShutdownReport>,
}

impl TestService {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.http_addr, path)
    }

    /// Trigger shutdown and wait for the report.
    pub async fn stop(self) -> ShutdownReport {
        self.shutdown.trigger();
        self.handle.await.unwrap()
    }
}

pub async fn start_service(config: ServiceConfig, store: Arc<dyn UserStore>) -> TestService {
    let service = lifecycle::bind_service(&config, store).await.unwrap();
    let http_addr = service.local_addr(HttpServer::NAME).unwrap();
    let rpc_addr = service.local_addr(RpcServer::NAME).unwrap();
    let shutdown = service.shutdown_handle();
    let handle = tokio::spawn(service.run_until(std::future::pending()));

    TestService {
        http_addr,
        rpc_addr,
        shutdown,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[allow(dead_code)]
pub fn fields(name: &str, age: i32) -> UserFields {
    UserFields {
        name: name.to_string(),
        email: format!("{}@x.io", name.to_lowercase()),
        age,
    }
}

/// Store whose `list` takes `delay` to answer, to hold a request in flight.
#[allow(dead_code)]
pub struct DelayedStore {
    inner: InMemoryUserStore,
    delay: Duration,
}

#[allow(dead_code)]
impl DelayedStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryUserStore::new(),
            delay,
        }
    }
}

impl UserStore for DelayedStore {
    fn create(&self, fields: UserFields) -> User {
        self.inner.create(fields)
    }

    fn get(&self, id: &str) -> Result<User, StoreError> {
        self.inner.get(id)
    }

    fn list(&self) -> Vec<User> {
        std::thread::sleep(self.delay);
        self.inner.list()
    }

    fn update(&self, id: &str, fields: UserFields) -> Result<User, StoreError> {
        self.inner.update(id, fields)
    }

    fn delete(&self, id: &str) -> bool {
        self.inner.delete(id)
    }
}
