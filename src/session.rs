use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{FsError, FsResult};
use crate::params::ConnectParams;
use crate::transport::{Transport, TransportFactory};

/// Shared handle to a session's one transport connection. The mutex is
/// the serialization point: one in-flight remote operation at a time.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

/// One validated, open connection to a remote endpoint.
///
/// The lifecycle is strictly linear: parameters are validated before any
/// connection attempt, the connection is opened exactly once, and after
/// `close` the session cannot be reopened. Dropping an unclosed session
/// releases the connection without the protocol goodbye; `close` is the
/// graceful path.
pub struct FsSession {
    params: ConnectParams,
    transport: Option<SharedTransport>,
    state: SessionState,
}

impl FsSession {
    /// Validates the parameters and opens the transport. The factory is
    /// never invoked when validation fails.
    pub(crate) async fn start(
        params: ConnectParams,
        factory: &dyn TransportFactory,
    ) -> FsResult<Self> {
        validate_connect_params(&params)?;

        tracing::debug!(host = %params.host, protocol = ?params.protocol(), "opening session");
        let transport = factory.open(&params).await?;

        Ok(Self {
            params,
            transport: Some(Arc::new(Mutex::new(transport))),
            state: SessionState::Open,
        })
    }

    pub fn params(&self) -> &ConnectParams {
        &self.params
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn transport(&self) -> FsResult<SharedTransport> {
        self.transport
            .clone()
            .ok_or_else(|| FsError::transport("session", "session is closed"))
    }

    /// Releases the transport connection. Closing twice is a no-op.
    pub async fn close(&mut self) -> FsResult<()> {
        if let Some(transport) = self.transport.take() {
            self.state = SessionState::Closed;
            transport.lock().await.close().await?;
        }
        Ok(())
    }
}

/// Pre-flight precondition checks, run before any transport call: host
/// and username must be supplied, and a fingerprint must be supplied
/// unless verification is explicitly waived.
///
/// Failures are configuration errors, never transport errors.
pub(crate) fn validate_connect_params(params: &ConnectParams) -> FsResult<()> {
    if params.host.trim().is_empty() {
        return Err(FsError::Configuration("host is null or empty".into()));
    }
    if params.username.trim().is_empty() {
        return Err(FsError::Configuration("username is null or empty".into()));
    }
    if !params.accept_any()
        && params.fingerprint().map_or(true, |f| f.trim().is_empty())
    {
        return Err(FsError::Configuration(
            "fingerprint is null or empty and accept_any is not set".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;

    fn valid_params() -> ConnectParams {
        let mut params = ConnectParams::new(Protocol::Sftp);
        params.host = "files.example.com".to_string();
        params.username = "alice".to_string();
        params.set_fingerprint(Some("SHA256:abcdef".to_string()));
        params
    }

    #[test]
    fn test_valid_params_pass() {
        assert!(validate_connect_params(&valid_params()).is_ok());
    }

    #[test]
    fn test_empty_host_rejected() {
        let mut params = valid_params();
        params.host = "  ".to_string();
        assert!(matches!(
            validate_connect_params(&params),
            Err(FsError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_username_rejected() {
        let mut params = valid_params();
        params.username = String::new();
        assert!(matches!(
            validate_connect_params(&params),
            Err(FsError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_fingerprint_rejected_unless_accept_any() {
        let mut params = valid_params();
        params.set_fingerprint(None);
        assert!(matches!(
            validate_connect_params(&params),
            Err(FsError::Configuration(_))
        ));

        params.set_accept_any(true);
        assert!(validate_connect_params(&params).is_ok());
    }
}
