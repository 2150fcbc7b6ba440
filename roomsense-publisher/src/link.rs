use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::PublisherError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Something the publisher has to reach before it can do useful work.
#[async_trait]
pub trait Endpoint: Send {
    fn name(&self) -> &'static str;

    async fn connect(&mut self) -> Result<(), PublisherError>;
}

/// Network path to the broker host.
///
/// The network is usable once the broker host answers a TCP connection
/// attempt, even with a refusal. Unresolvable names, unreachable routes and
/// silent hosts all count as no network.
pub struct HostLink {
    host: String,
    port: u16,
    timeout: Duration,
}

impl HostLink {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Endpoint for HostLink {
    fn name(&self) -> &'static str {
        "network"
    }

    async fn connect(&mut self) -> Result<(), PublisherError> {
        let attempt = timeout(self.timeout, TcpStream::connect((self.host.as_str(), self.port)))
            .await
            .map_err(|_| PublisherError::Link(format!("{}:{} silent for {:?}", self.host, self.port, self.timeout)))?;

        match attempt {
            Ok(stream) => {
                tracing::debug!("broker host {} reachable via {:?}", self.host, stream.local_addr());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                tracing::debug!("broker host {} reachable, port {} closed", self.host, self.port);
                Ok(())
            }
            Err(e) => Err(PublisherError::Link(format!("cannot reach {}:{}: {e}", self.host, self.port))),
        }
    }
}
