//! Network layer: pluggable dialers and the DNS-caching wrapper
//!
//! The default HTTP transport resolves hosts through a
//! `DnsCache<LookupDialer>`, so repeated fetches from one host resolve once
//! per staleness window and hosts that failed (or resolved to private
//! addresses) are refused without another lookup.

mod dialer;
mod dnscache;

pub use dialer::{Dial, LookupDialer, RemoteAddr, TcpDialer};
pub use dnscache::DnsCache;
