//! Inbound RPC: accept loop and the handler seam.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::codec::{read_frame, write_frame};
use crate::message::{Request, Response};

/// The seam between transport and node semantics.
///
/// The node crate implements this; the transport never interprets a
/// request. Handlers are infallible at this boundary — node-level
/// failures travel back as [`Response::Fault`].
#[async_trait::async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    /// Execute one request and produce its response.
    async fn handle(&self, request: Request) -> Response;
}

/// Run the RPC server until the shutdown signal fires.
///
/// One task per inbound connection; each connection carries a stream
/// of request frames answered in order. Connection tasks also watch
/// the shutdown channel so a stopping node drops its peers promptly.
pub async fn serve(
    listener: TcpListener,
    handler: Arc<dyn RpcHandler>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, remote)) => {
                        trace!(%remote, "accepted rpc connection");
                        let handler = handler.clone();
                        let shutdown = shutdown.resubscribe();
                        tokio::spawn(serve_connection(stream, handler, shutdown));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
    debug!("rpc server stopped");
}

async fn serve_connection(
    mut stream: TcpStream,
    handler: Arc<dyn RpcHandler>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let request: Request = tokio::select! {
            _ = shutdown.recv() => break,
            read = read_frame(&mut stream) => match read {
                Ok(request) => request,
                // Peers drop connections freely; EOF here is routine.
                Err(_) => break,
            }
        };

        let response = handler.handle(request).await;
        if let Err(e) = write_frame(&mut stream, &response).await {
            trace!(error = %e, "rpc connection closed mid-response");
            break;
        }
    }
}
