use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// Default upper bound for an outbound connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to a device, giving up after `timeout`.
///
/// Nagle is disabled: command frames are tiny and must go out immediately.
pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<TcpStream> {
    let attempt = TcpStream::connect(endpoint.as_pair());
    let stream = match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(TransportError::Connect {
                endpoint: endpoint.clone(),
                source,
            })
        }
        Err(_) => {
            return Err(TransportError::ConnectTimeout {
                endpoint: endpoint.clone(),
                timeout,
            })
        }
    };

    stream.set_nodelay(true)?;
    debug!(%endpoint, "connected to device");
    Ok(stream)
}

/// Bind a listening socket (used by the device simulator and tests).
pub async fn bind(endpoint: &Endpoint) -> Result<TcpListener> {
    let listener = TcpListener::bind(endpoint.as_pair())
        .await
        .map_err(|source| TransportError::Bind {
            endpoint: endpoint.clone(),
            source,
        })?;
    info!(endpoint = %listener.local_addr()?, "listening for controllers");
    Ok(listener)
}
