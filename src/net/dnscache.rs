//! LRU cache of dial results keyed by (network, address)

use super::dialer::{Dial, RemoteAddr};
use crate::config::FetcherConfig;
use lru::LruCache;
use parking_lot::RwLock;
use hyper::client::connect::dns::Name;
use reqwest::dns::{Addrs, Resolve, Resolving};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    network: String,
    address: String,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    resolved: Option<SocketAddr>,
    blacklisted: bool,
    last_error: Option<(io::ErrorKind, String)>,
    queried_at: Instant,
}

impl CacheEntry {
    fn error(&self) -> io::Error {
        match &self.last_error {
            Some((kind, message)) => io::Error::new(*kind, message.clone()),
            None => io::Error::new(io::ErrorKind::PermissionDenied, "blacklisted address"),
        }
    }
}

struct Inner<D> {
    dialer: D,
    entries: RwLock<LruCache<CacheKey, CacheEntry>>,
    staleness: Duration,
    blacklist_private: bool,
}

/// A dialer that remembers where names resolved to, and which ones failed
///
/// Fresh entries are dialed by address, skipping resolution; blacklisted
/// entries fail without touching the network until they go stale. The lock
/// is never held while dialing.
pub struct DnsCache<D: Dial> {
    inner: Arc<Inner<D>>,
}

impl<D: Dial> Clone for DnsCache<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Dial> DnsCache<D> {
    pub fn new(dialer: D, capacity: usize, staleness: Duration, blacklist_private: bool) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Inner {
                dialer,
                entries: RwLock::new(LruCache::new(capacity)),
                staleness,
                blacklist_private,
            }),
        }
    }

    pub fn from_config(dialer: D, config: &FetcherConfig) -> Self {
        Self::new(
            dialer,
            config.max_dns_cache_entries,
            config.dns_staleness(),
            config.blacklist_private_ips,
        )
    }

    pub fn dialer(&self) -> &D {
        &self.inner.dialer
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks for an entry without touching its recency
    pub fn contains(&self, network: &str, address: &str) -> bool {
        self.inner.entries.read().contains(&key(network, address))
    }

    /// Dials `address`, consulting and updating the cache
    pub async fn dial(&self, network: &str, address: &str) -> io::Result<D::Conn> {
        let key = key(network, address);
        let cached = self.inner.entries.read().peek(&key).cloned();

        let entry = match cached {
            Some(entry) if entry.queried_at.elapsed() < self.inner.staleness => entry,
            _ => return self.refresh(key).await,
        };

        self.inner.entries.write().promote(&key);

        if entry.blacklisted {
            return Err(entry.error());
        }

        let Some(resolved) = entry.resolved else {
            return self.refresh(key).await;
        };

        match self
            .inner
            .dialer
            .dial(&key.network, &resolved.to_string())
            .await
        {
            Ok(conn) => Ok(conn),
            Err(e) => {
                tracing::debug!(address, error = %e, "Direct dial failed, evicting cache entry");
                self.inner.entries.write().pop(&key);
                Err(e)
            }
        }
    }

    async fn refresh(&self, key: CacheKey) -> io::Result<D::Conn> {
        let result = self.inner.dialer.dial(&key.network, &key.address).await;
        let now = Instant::now();

        let (entry, outcome) = match result {
            Ok(conn) => match conn.remote_addr() {
                Ok(addr) if self.inner.blacklist_private && is_private(addr.ip()) => {
                    let message = format!("{} resolved to private address {}", key.address, addr.ip());
                    let entry = CacheEntry {
                        resolved: Some(addr),
                        blacklisted: true,
                        last_error: Some((io::ErrorKind::PermissionDenied, message)),
                        queried_at: now,
                    };
                    let err = entry.error();
                    (entry, Err(err))
                }
                Ok(addr) => (
                    CacheEntry {
                        resolved: Some(addr),
                        blacklisted: false,
                        last_error: None,
                        queried_at: now,
                    },
                    Ok(conn),
                ),
                Err(_) => return Ok(conn),
            },
            Err(e) => (
                CacheEntry {
                    resolved: None,
                    blacklisted: true,
                    last_error: Some((e.kind(), e.to_string())),
                    queried_at: now,
                },
                Err(e),
            ),
        };

        self.inner.entries.write().put(key, entry);
        outcome
    }
}

fn key(network: &str, address: &str) -> CacheKey {
    CacheKey {
        network: network.to_string(),
        address: address.to_ascii_lowercase(),
    }
}

/// Loopback, private, link-local and unspecified addresses
fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private(IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

impl<D> Resolve for DnsCache<D>
where
    D: Dial<Conn = SocketAddr>,
{
    fn resolve(&self, name: Name) -> Resolving {
        let cache = self.clone();
        Box::pin(async move {
            let addr = cache.dial("tcp", &format!("{}:0", name.as_str())).await?;
            let addrs: Addrs = Box::new(std::iter::once(addr));
            Ok(addrs)
        })
    }
}
