//! Raw dialers wrapped by the DNS cache

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::net::{lookup_host, TcpStream};

/// A dialed connection that knows which address it reached
pub trait RemoteAddr {
    fn remote_addr(&self) -> io::Result<SocketAddr>;
}

impl RemoteAddr for TcpStream {
    fn remote_addr(&self) -> io::Result<SocketAddr> {
        self.peer_addr()
    }
}

impl RemoteAddr for SocketAddr {
    fn remote_addr(&self) -> io::Result<SocketAddr> {
        Ok(*self)
    }
}

/// A network connect function
///
/// `network` is one of `tcp`, `tcp4` or `tcp6`; `address` is `host:port`
/// where host may be a name or an IP literal.
#[async_trait]
pub trait Dial: Send + Sync + 'static {
    type Conn: RemoteAddr + Send;

    async fn dial(&self, network: &str, address: &str) -> io::Result<Self::Conn>;
}

/// Address family filter derived from the network name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Any,
    V4,
    V6,
}

impl Family {
    fn parse(network: &str) -> io::Result<Self> {
        match network {
            "tcp" => Ok(Self::Any),
            "tcp4" => Ok(Self::V4),
            "tcp6" => Ok(Self::V6),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported network: {}", other),
            )),
        }
    }

    fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            Self::Any => true,
            Self::V4 => addr.is_ipv4(),
            Self::V6 => addr.is_ipv6(),
        }
    }
}

async fn resolve(network: &str, address: &str) -> io::Result<Vec<SocketAddr>> {
    let family = Family::parse(network)?;
    let addrs: Vec<SocketAddr> = lookup_host(address)
        .await?
        .filter(|a| family.accepts(a))
        .collect();

    if addrs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no {} address for {}", network, address),
        ));
    }
    Ok(addrs)
}

/// Opens TCP connections, trying each resolved address in turn
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dial for TcpDialer {
    type Conn = TcpStream;

    async fn dial(&self, network: &str, address: &str) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in resolve(network, address).await? {
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("cannot dial {}", address))
        }))
    }
}

/// Resolves without connecting; the "connection" is the first address
///
/// Used beneath the HTTP client's resolver hook, where the client opens
/// the socket itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupDialer;

#[async_trait]
impl Dial for LookupDialer {
    type Conn = SocketAddr;

    async fn dial(&self, network: &str, address: &str) -> io::Result<SocketAddr> {
        let addrs = resolve(network, address).await?;
        Ok(addrs[0])
    }
}
