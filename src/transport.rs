use crate::query::PreparedQuery;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::{Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const DEFAULT_DNS_PORT: u16 = 53;

/// What the engine needs from a reply, flattened across transfer messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub rcode: ResponseCode,
    pub authentic_data: bool,
    pub authoritative: bool,
    pub answers: Vec<Record>,
}

impl Response {
    pub fn from_message(message: &Message) -> Self {
        Response {
            rcode: message.response_code(),
            authentic_data: message.authentic_data(),
            authoritative: message.authoritative(),
            answers: message.answers().to_vec(),
        }
    }

    /// Folds another message of the same transfer into this response.
    /// The first failure code sticks.
    fn absorb(&mut self, message: &Message) {
        if self.rcode == ResponseCode::NoError {
            self.rcode = message.response_code();
        }
        self.authentic_data &= message.authentic_data();
        self.authoritative &= message.authoritative();
        self.answers.extend_from_slice(message.answers());
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid resolver address {0:?}")]
    Resolver(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed DNS message: {0}")]
    Proto(#[from] hickory_proto::error::ProtoError),

    #[error("TSIG verification failed: {0}")]
    Tsig(String),

    #[error("message too large for TCP framing ({0} bytes)")]
    Oversized(usize),

    #[error("zone transfer ended before the closing SOA")]
    TruncatedTransfer,
}

/// The protocol collaborator: one request/response round trip against a resolver.
pub trait Exchange: Send + Sync + 'static {
    fn exchange(
        &self,
        query: &PreparedQuery,
        resolver: &str,
    ) -> impl Future<Output = Result<Response, ExchangeError>> + Send;
}

/// Accepts `host:port`, `[v6]:port` or a bare IP address (port 53).
pub fn parse_resolver(resolver: &str) -> Result<SocketAddr, ExchangeError> {
    let trimmed = resolver.trim();
    if let Ok(addr) = trimmed.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_DNS_PORT));
    }
    Err(ExchangeError::Resolver(resolver.to_string()))
}

/// DNS over TCP with RFC 1035 two-byte length framing.
#[derive(Debug, Clone)]
pub struct TcpExchange {
    timeout: Duration,
}

impl TcpExchange {
    pub fn new(timeout: Duration) -> Self {
        TcpExchange { timeout }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, ExchangeError>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(ExchangeError::from),
            Err(_) => Err(ExchangeError::Timeout(self.timeout)),
        }
    }

    async fn read_frame(&self, stream: &mut TcpStream) -> Result<Option<Vec<u8>>, ExchangeError> {
        let mut len_bytes = [0u8; 2];
        match self.bounded(stream.read_exact(&mut len_bytes)).await {
            Ok(_) => {}
            Err(ExchangeError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let len = u16::from_be_bytes(len_bytes) as usize;
        let mut buf = vec![0u8; len];
        self.bounded(stream.read_exact(&mut buf)).await?;
        Ok(Some(buf))
    }
}

impl Exchange for TcpExchange {
    async fn exchange(&self, query: &PreparedQuery, resolver: &str) -> Result<Response, ExchangeError> {
        let addr = parse_resolver(resolver)?;

        let mut message = query.message.clone();
        let mut verifier = match &query.credential {
            Some(credential) => {
                tracing::debug!(
                    "Signing request to {} with TSIG key {} ({:?})",
                    addr,
                    credential.key_name(),
                    credential.algorithm()
                );
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as u32)
                    .unwrap_or_default();
                message.finalize(credential.signer(), now)?
            }
            None => None,
        };

        let request = message.to_bytes()?;
        let len = u16::try_from(request.len()).map_err(|_| ExchangeError::Oversized(request.len()))?;
        let mut frame = Vec::with_capacity(request.len() + 2);
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&request);

        let mut stream = self.bounded(TcpStream::connect(addr)).await?;
        self.bounded(stream.write_all(&frame)).await?;

        let mut response: Option<Response> = None;
        let mut soa_seen = 0usize;

        loop {
            let bytes = match self.read_frame(&mut stream).await? {
                Some(bytes) => bytes,
                None if query.is_transfer() && response.is_some() => {
                    return Err(ExchangeError::TruncatedTransfer);
                }
                None => {
                    return Err(ExchangeError::Io(std::io::ErrorKind::UnexpectedEof.into()));
                }
            };

            let reply = Message::from_bytes(&bytes)?;
            if reply.id() != message.id() {
                tracing::debug!("Discarding reply with mismatched id {} from {}", reply.id(), addr);
                continue;
            }

            // Rejected TSIG requests come back unsigned; let the rcode speak for them.
            if let Some(verify) = verifier.as_mut()
                && reply.response_code() == ResponseCode::NoError
            {
                verify(&bytes).map_err(|e| ExchangeError::Tsig(e.to_string()))?;
            }

            soa_seen += reply
                .answers()
                .iter()
                .filter(|r| r.record_type() == RecordType::SOA)
                .count();

            match response.as_mut() {
                Some(existing) => existing.absorb(&reply),
                None => response = Some(Response::from_message(&reply)),
            }

            let done = match &response {
                Some(_) if !query.is_transfer() => true,
                Some(r) => r.rcode != ResponseCode::NoError || soa_seen >= 2,
                None => false,
            };

            if done {
                break;
            }
        }

        response.ok_or(ExchangeError::TruncatedTransfer)
    }
}
