//! Finding a free port to listen on.

use std::io;

use tokio::net::TcpListener;
use tracing::trace;

use crate::error::{TransportError, TransportResult};

/// Binds the first free port in `base..base + attempts` on `host`.
///
/// A `base` of `0` binds an OS-assigned port. Ports that are already taken
/// are skipped; any other bind error is returned as is.
pub async fn bind_first_free(host: &str, base: u16, attempts: u16) -> TransportResult<TcpListener> {
    if base == 0 {
        return Ok(TcpListener::bind((host, 0)).await?);
    }

    let last = base.saturating_add(attempts.max(1) - 1);
    for port in base..=last {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) if is_taken(&e) => {
                trace!(host, port, "Port in use, trying next");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(TransportError::PortSearch {
        host: host.to_string(),
        base,
        attempts,
    })
}

fn is_taken(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied
    )
}
