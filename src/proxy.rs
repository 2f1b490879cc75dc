use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::edge::EdgeRouter;
use crate::error::InterceptError;
use crate::logger::log_request;
use crate::request::FetchRequest;
use crate::worker::Registration;

struct ProxyState {
    origin: Url,
    edge: Option<EdgeRouter>,
    registration: Arc<Registration>,
}

/// HTTP front door: edge router first, then the cache worker.
pub struct ProxyServer {
    addr: SocketAddr,
    state: Arc<ProxyState>,
}

impl ProxyServer {
    /// `origin` is the public origin requests are assumed to be addressed to.
    pub fn new(addr: SocketAddr, origin: Url, registration: Arc<Registration>) -> Self {
        info!("Creating proxy server on {} for {}", addr, origin);
        Self {
            addr,
            state: Arc::new(ProxyState {
                origin,
                edge: None,
                registration,
            }),
        }
    }

    pub fn with_edge(self, edge: EdgeRouter) -> Self {
        let state = ProxyState {
            origin: self.state.origin.clone(),
            edge: Some(edge),
            registration: self.state.registration.clone(),
        };
        Self {
            addr: self.addr,
            state: Arc::new(state),
        }
    }

    #[tracing::instrument(skip(self, shutdown), fields(addr = %self.addr))]
    pub async fn run<F>(&self, shutdown: F) -> Result<(), InterceptError>
    where
        F: Future<Output = ()>,
    {
        info!("Starting proxy server on {}", self.addr);
        let state = self.state.clone();

        let make_svc = make_service_fn(move |conn: &AddrStream| {
            let remote_addr = conn.remote_addr();
            debug!("New connection from: {}", remote_addr);
            let state = state.clone();

            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let state = state.clone();
                    Self::handle_request(req, state)
                }))
            }
        });

        let server = Server::try_bind(&self.addr)?
            .serve(make_svc)
            .with_graceful_shutdown(shutdown);
        info!("Proxy server is ready to accept connections");

        if let Err(e) = server.await {
            error!("Server error: {}", e);
            return Err(InterceptError::Network(e.to_string()));
        }
        Ok(())
    }

    async fn handle_request(
        req: Request<Body>,
        state: Arc<ProxyState>,
    ) -> Result<Response<Body>, Infallible> {
        Ok(Self::respond(req, &state).await)
    }

    async fn respond(req: Request<Body>, state: &ProxyState) -> Response<Body> {
        let started = Instant::now();
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let request = match FetchRequest::from_hyper(req, &state.origin).await {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejecting malformed request {}: {}", path, e);
                return Self::error_response(StatusCode::BAD_REQUEST, &e);
            }
        };

        let result = match &state.edge {
            Some(edge) => edge.handle(&request, state.registration.as_ref()).await,
            None => state.registration.handle_fetch(&request).await.map(|o| o.response),
        };

        let response = match result {
            Ok(response) => response.into_hyper(),
            Err(e) => {
                warn!("Request {} {} failed: {}", method, path, e);
                Self::error_response(StatusCode::BAD_GATEWAY, &e)
            }
        };

        log_request(&method, &path, response.status(), started.elapsed());
        response
    }

    fn error_response(status: StatusCode, error: &InterceptError) -> Response<Body> {
        let mut response = Response::new(Body::from(error.to_string()));
        *response.status_mut() = status;
        response
    }
}
