//! The bounded worker pool (§4.7): an acceptor task feeding accepted
//! connections into a bounded channel that `worker_count` worker tasks pull
//! from, each serving one connection at a time through a `tower::Service`
//! adapter bridged into hyper's low-level connection driver.
//!
//! This deliberately does not use `axum::serve`, which spawns one task per
//! accepted connection unconditionally — §4.7 calls for a fixed-size pool
//! bounding total concurrent connection-handling tasks, with backpressure
//! applied at the acceptor once the channel fills up.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tower::Service;

use crate::handlers::{self, Dispatcher};

/// The `tower::Service` adapter the spec calls for (§4.7): wraps one shared
/// `Dispatcher` and forwards each request to `handlers::dispatch`.
///
/// Generic over the request body so the same adapter drives both the real
/// connection loop below (`Incoming`) and in-process tests that exercise the
/// whole dispatcher via `tower::ServiceExt::oneshot` against a plain
/// `Full<Bytes>` body, without binding a socket.
pub struct DispatchService<B = Incoming> {
    dispatcher: Arc<Dispatcher>,
    _body: std::marker::PhantomData<fn() -> B>,
}

impl<B> DispatchService<B> {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        DispatchService { dispatcher, _body: std::marker::PhantomData }
    }
}

impl<B> Clone for DispatchService<B> {
    fn clone(&self) -> Self {
        DispatchService { dispatcher: self.dispatcher.clone(), _body: std::marker::PhantomData }
    }
}

impl<B> Service<Request<B>> for DispatchService<B>
where
    B: handlers::RequestBody,
    B::Error: std::fmt::Display,
{
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let dispatcher = self.dispatcher.clone();
        Box::pin(async move { Ok(handlers::dispatch(dispatcher, req).await) })
    }
}

/// Configuration for [`serve`].
pub struct PoolConfig {
    pub worker_count: usize,
    /// Bound on the acceptor→worker channel (§4.7: "a bounded queue of
    /// accepted connections applies backpressure once full").
    pub queue_capacity: usize,
}

/// Binds `addr` and runs the acceptor + worker pool until `shutdown` fires,
/// then waits for every in-flight connection to finish before returning
/// (§5 "in-flight tasks run to completion").
pub async fn serve(
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    config: PoolConfig,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, workers = config.worker_count, "trx dispatcher listening");

    let (tx, rx) = mpsc::channel::<(TcpStream, SocketAddr)>(config.queue_capacity);
    let rx = Arc::new(Mutex::new(rx));

    let mut worker_handles = Vec::with_capacity(config.worker_count);
    for worker_id in 0..config.worker_count {
        let rx = rx.clone();
        let dispatcher = dispatcher.clone();
        worker_handles.push(tokio::spawn(async move {
            worker_loop(worker_id, rx, dispatcher).await;
        }));
    }

    let acceptor = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        tracing::info!("acceptor shutting down, no longer accepting new connections");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                // A full channel applies backpressure directly onto the
                                // accept loop: the OS backlog absorbs bursts instead of
                                // the pool spawning unbounded tasks.
                                if tx.send((stream, peer)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "failed to accept connection"),
                        }
                    }
                }
            }
            // Dropping `tx` here lets every worker's `recv()` observe `None`
            // once the queue drains, ending their loops.
        })
    };

    acceptor.await.ok();
    for handle in worker_handles {
        handle.await.ok();
    }

    tracing::info!("trx dispatcher stopped");
    Ok(())
}

async fn worker_loop(worker_id: usize, rx: Arc<Mutex<mpsc::Receiver<(TcpStream, SocketAddr)>>>, dispatcher: Arc<Dispatcher>) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some((stream, peer)) = next else {
            tracing::debug!(worker_id, "worker exiting, channel closed");
            break;
        };

        let io = TokioIo::new(stream);
        let service = TowerToHyperService::new(DispatchService::<Incoming>::new(dispatcher.clone()));

        if let Err(e) = ConnBuilder::new(TokioExecutor::new()).serve_connection(io, service).await {
            tracing::debug!(worker_id, %peer, error = %e, "connection ended with an error");
        }
    }
}
