//! The concurrent HTTP Dispatcher (§4.6, §4.7): route matching, JSON
//! request/response handling, and the bounded worker pool that serves them.

mod handlers;
mod pool;
mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use trx_core::TrxError;
use trx_exec::Interpreter;

pub use handlers::Dispatcher;
pub use pool::{DispatchService, PoolConfig};
pub use router::RouteTable;

/// Builds the route table for `interpreter`'s module and serves it on `addr`
/// until `shutdown` is cancelled (§4.6, §4.7, §5). `default_procedure` names
/// the procedure `GET /procedures` reports as the dispatcher's default, if
/// any.
pub async fn serve(
    addr: SocketAddr,
    interpreter: Arc<Interpreter>,
    title: &str,
    version: &str,
    default_procedure: Option<&str>,
    config: PoolConfig,
    shutdown: CancellationToken,
) -> Result<(), TrxError> {
    let routes = Arc::new(RouteTable::build(interpreter.module(), title, version, default_procedure)?);
    let dispatcher = Arc::new(Dispatcher { interpreter, routes });

    pool::serve(addr, dispatcher, config, shutdown)
        .await
        .map_err(|e| TrxError::internal(format!("HTTP server error: {e}")))
}
