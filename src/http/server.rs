//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout, body limit, panic guard, metrics)
//! - Bounded accept loop serving HTTP/1.1, one task per connection
//! - On shutdown: stop accepting, let each connection finish its current
//!   response, then close

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use futures_util::future::BoxFuture;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use tokio::task::{JoinError, JoinSet};
use tower_http::{
    catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::Instrument;

use crate::config::HttpConfig;
use crate::http::handlers;
use crate::http::request::{make_request_span, propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::{Listener, ShutdownSignal};
use crate::net::{self, BoundedListener, ListenerError};
use crate::observability::metrics;
use crate::store::UserStore;

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
}

/// REST listener bound to the shared store.
pub struct HttpServer {
    listener: BoundedListener,
    router: Router,
    local_addr: SocketAddr,
}

impl HttpServer {
    pub const NAME: &'static str = "http";

    /// Bind the configured address and build the router.
    pub async fn bind(config: &HttpConfig, store: Arc<dyn UserStore>) -> Result<Self, ListenerError> {
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
            router: build_router(config, AppState { store }),
            local_addr,
        })
    }

    async fn run(self, mut shutdown: ShutdownSignal) -> std::io::Result<()> {
        let HttpServer {
            listener,
            router,
            local_addr,
        } = self;
        tracing::info!(
            address = %local_addr,
            max_connections = listener.max_connections(),
            "HTTP server starting"
        );

        let mut builder = http1::Builder::new();
        builder.timer(TokioTimer::new());
        let graceful = GracefulShutdown::new();
        // Connections are owned here: aborting this task aborts every one of
        // them, including requests still in a handler.
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let service = TowerToHyperService::new(router.clone());
                        let connection =
                            graceful.watch(builder.serve_connection(TokioIo::new(stream), service));
                        let span = tracing::debug_span!("http_connection", peer = %peer);
                        connections.spawn(
                            async move {
                                let _permit = permit;
                                if let Err(e) = connection.await {
                                    tracing::debug!(error = %e, "Connection ended with error");
                                }
                            }
                            .instrument(span),
                        );
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

        drop(listener);
        tracing::info!(
            active_connections = connections.len(),
            "HTTP server draining connections"
        );
        // Idle keep-alive connections close at once, busy ones after their response.
        graceful.shutdown().await;
        while let Some(joined) = connections.join_next().await {
            log_join_result(joined);
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

impl Listener for HttpServer {
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
            tracing::error!(error = %e, "HTTP connection task panicked");
        }
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &HttpConfig, state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/api/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .with_state(state)
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn(record_metrics))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
}

async fn record_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let response = next.run(request).await;
    metrics::record_http_request(&method, response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::X_REQUEST_ID;
    use crate::store::{InMemoryUserStore, StoreError, User, UserFields};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router_with(store: Arc<dyn UserStore>) -> Router {
        build_router(&HttpConfig::default(), AppState { store })
    }

    fn router() -> (Router, Arc<InMemoryUserStore>) {
        let store = Arc::new(InMemoryUserStore::new());
        (router_with(store.clone()), store)
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: Method, uri: &str) -> Request {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn ann() -> UserFields {
        UserFields {
            name: "Ann".into(),
            email: "ann@x.io".into(),
            age: 30,
        }
    }

    #[tokio::test]
    async fn create_returns_201_with_generated_id() {
        let (app, store) = router();
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/users",
                json!({"name": "Ann", "email": "ann@x.io", "age": 30}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let user: User = serde_json::from_value(body_json(response).await).unwrap();
        assert!(!user.id.is_empty());
        assert_eq!(store.get(&user.id).unwrap(), user);
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let (app, store) = router();
        let response = app
            .oneshot(json_request(Method::POST, "/api/users", json!({"name": 7})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unknown_user_is_404() {
        let (app, _) = router();
        for request in [
            empty_request(Method::GET, "/api/users/nope"),
            empty_request(Method::DELETE, "/api/users/nope"),
            json_request(Method::PUT, "/api/users/nope", json!(ann())),
        ] {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(body_json(response).await, json!({"error": "User not found"}));
        }
    }

    #[tokio::test]
    async fn update_uses_path_id_not_body_id() {
        let (app, store) = router();
        let user = store.create(ann());

        let response = app
            .oneshot(json_request(
                Method::PUT,
                &format!("/api/users/{}", user.id),
                json!({"id": "forged", "name": "Ann K", "email": "ann@x.io", "age": 31}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let updated: User = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(updated.id, user.id);
        assert_eq!(updated.name, "Ann K");
        assert!(store.get("forged").is_err());
    }

    #[tokio::test]
    async fn delete_is_204_then_404() {
        let (app, store) = router();
        let user = store.create(ann());
        let uri = format!("/api/users/{}", user.id);

        let first = app
            .clone()
            .oneshot(empty_request(Method::DELETE, &uri))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::NO_CONTENT);

        let second = app.oneshot(empty_request(Method::DELETE, &uri)).await.unwrap();
        assert_eq!(second.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_returns_every_user() {
        let (app, store) = router();
        store.create(ann());
        store.create(ann());

        let response = app
            .oneshot(empty_request(Method::GET, "/api/users"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn request_id_is_generated_and_echoed() {
        let (app, _) = router();

        let generated = app
            .clone()
            .oneshot(empty_request(Method::GET, "/health"))
            .await
            .unwrap();
        assert!(generated.headers().contains_key(X_REQUEST_ID));

        let mut request = empty_request(Method::GET, "/health");
        request
            .headers_mut()
            .insert(X_REQUEST_ID, "req-42".parse().unwrap());
        let echoed = app.oneshot(request).await.unwrap();
        assert_eq!(echoed.headers()[X_REQUEST_ID], "req-42");
    }

    struct PanickingStore;

    impl UserStore for PanickingStore {
        fn create(&self, _fields: UserFields) -> User {
            panic!("create exploded")
        }
        fn get(&self, id: &str) -> Result<User, StoreError> {
            Err(StoreError::NotFound(id.to_string()))
        }
        fn list(&self) -> Vec<User> {
            panic!("list exploded")
        }
        fn update(&self, id: &str, _fields: UserFields) -> Result<User, StoreError> {
            Err(StoreError::NotFound(id.to_string()))
        }
        fn delete(&self, _id: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn handler_panic_becomes_500() {
        let app = router_with(Arc::new(PanickingStore));

        let response = app
            .clone()
            .oneshot(empty_request(Method::GET, "/api/users"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // The router keeps serving.
        let response = app
            .oneshot(empty_request(Method::GET, "/api/users/x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
