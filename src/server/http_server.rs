use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::DispatchService;
use crate::dispatcher::Dispatcher;

/// Pause after a failed `accept()`, e.g. on `EMFILE`.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// HTTP/1.1 server in front of a dispatcher.
pub struct HttpServer {
    service: DispatchService,
}

/// Handle to a running server.
///
/// Dropping the handle leaves the server running; call [`ServerHandle::stop`]
/// to shut it down.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound address. Useful when binding to port 0.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections, let in-flight requests on open
    /// connections finish, and wait for the accept loop to exit.
    pub async fn stop(self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        self.task.await.context("server task failed")?;
        info!(addr = %self.addr, "Server stopped");
        Ok(())
    }

    /// Run until the process receives Ctrl-C, then stop.
    pub async fn run_until_ctrl_c(self) -> anyhow::Result<()> {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("Shutdown signal received");
        self.stop().await
    }
}

impl HttpServer {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            service: DispatchService::new(dispatcher),
        }
    }

    /// Maximum accepted request body in bytes.
    #[must_use]
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.service = self.service.with_body_limit(limit);
        self
    }

    /// Bind and start serving in the background.
    pub async fn bind<A: ToSocketAddrs>(self, addr: A) -> anyhow::Result<ServerHandle> {
        let listener = TcpListener::bind(addr)
            .await
            .context("failed to bind listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read bound address")?;
        info!(
            addr = %addr,
            body_limit = self.service.body_limit(),
            routes = self.service.dispatcher().routes().len(),
            "Server listening"
        );

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::new(self.service),
            shutdown.clone(),
        ));
        Ok(ServerHandle {
            addr,
            shutdown,
            task,
        })
    }
}

async fn accept_loop(listener: TcpListener, service: Arc<DispatchService>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, remote_addr)) => {
                    tokio::spawn(serve_connection(
                        stream,
                        remote_addr,
                        Arc::clone(&service),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    if !backoff(ACCEPT_ERROR_BACKOFF, &shutdown).await {
                        break;
                    }
                }
            },
            () = shutdown.cancelled() => break,
        }
    }
}

/// Sleep for `delay`; returns `false` when shutdown fires first.
async fn backoff(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        () = shutdown.cancelled() => false,
    }
}

async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    service: Arc<DispatchService>,
    shutdown: CancellationToken,
) {
    let io = TokioIo::new(stream);
    let svc = service_fn(move |req: Request<Incoming>| {
        let service = Arc::clone(&service);
        async move { Ok::<_, Infallible>(service.call(req).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, svc);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.cancelled() => {
            debug!(remote_addr = %remote_addr, "Draining connection for shutdown");
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };
    if let Err(e) = result {
        debug!(remote_addr = %remote_addr, error = %e, "Connection closed with error");
    }
}
