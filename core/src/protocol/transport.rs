use crate::protocol::frame::{Message, Payload};
use crate::protocol::ProtocolError;
use crate::telemetry::log::LogManager;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Delivers framed messages to a receiver.
///
/// The scan loop only sees this trait, so a persistent-connection transport
/// can replace the one-shot sender without touching detection code.
pub trait Transport: Send + Sync {
    fn deliver(&self, message: &Message) -> Result<(), ProtocolError>;
}

/// Opens a new TCP connection per message, writes it and closes.
pub struct OneShotTcp {
    target: String,
    connect_timeout: Duration,
}

impl OneShotTcp {
    pub fn new(target: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            target: target.into(),
            connect_timeout,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn send_failure(&self, source: io::Error) -> ProtocolError {
        ProtocolError::SendFailure {
            target: self.target.clone(),
            source,
        }
    }

    fn resolve(&self) -> Result<SocketAddr, ProtocolError> {
        self.target
            .to_socket_addrs()
            .map_err(|err| self.send_failure(err))?
            .next()
            .ok_or_else(|| {
                self.send_failure(io::Error::new(
                    io::ErrorKind::NotFound,
                    "address resolved to nothing",
                ))
            })
    }
}

impl Transport for OneShotTcp {
    fn deliver(&self, message: &Message) -> Result<(), ProtocolError> {
        let addr = self.resolve()?;
        let mut stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|err| self.send_failure(err))?;
        stream
            .set_write_timeout(Some(self.connect_timeout))
            .map_err(|err| self.send_failure(err))?;
        message.write_to(&mut stream).map_err(|err| match err {
            ProtocolError::Io(source) => self.send_failure(source),
            other => other,
        })?;
        // the receiver may already have closed its end
        let _ = stream.shutdown(Shutdown::Write);
        Ok(())
    }
}

/// Front door used by the scan loop and the CLI to relay matrices and notices.
pub struct Distributor {
    transport: Box<dyn Transport>,
    logger: LogManager,
}

impl Distributor {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            logger: LogManager::new("relay"),
        }
    }

    pub fn one_shot(target: impl Into<String>, connect_timeout: Duration) -> Self {
        Self::new(Box::new(OneShotTcp::new(target, connect_timeout)))
    }

    pub fn distribute(&self, payload: &Payload) -> Result<(), ProtocolError> {
        let message = Message::from_payload(payload)?;
        self.transport.deliver(&message)?;
        self.logger.debug(&format!(
            "delivered {:?} of {} bytes",
            message.kind(),
            message.payload().len()
        ));
        Ok(())
    }
}
