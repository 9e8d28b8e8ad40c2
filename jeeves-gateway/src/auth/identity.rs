//! Caller identity extraction
//!
//! A verified bearer token yields a user identity. Everyone else is
//! anonymous and keyed by client IP. `X-Forwarded-For` is only read when the
//! socket peer is a configured trusted proxy; the client is then the
//! right-most hop that is not itself a trusted proxy.

use hyper::header::{HeaderMap, AUTHORIZATION};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

use super::jwt::{extract_token_from_header, JwtValidator};

pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Who is calling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Verified token subject
    User(String),
    /// Unauthenticated caller at this address
    Anonymous(IpAddr),
}

impl Identity {
    /// Key used for quota records
    pub fn key(&self) -> String {
        match self {
            Identity::User(sub) => sub.clone(),
            Identity::Anonymous(ip) => format!("anon:{}", ip),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Resolve the caller from request headers and the socket peer
pub fn resolve_identity(
    headers: &HeaderMap,
    peer: SocketAddr,
    jwt: Option<&JwtValidator>,
    trusted_proxies: &[IpAddr],
) -> Identity {
    if let Some(jwt) = jwt {
        let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        if let Some(token) = extract_token_from_header(header) {
            let result = jwt.verify_token(token);
            match result.claims {
                Some(claims) if result.valid => return Identity::User(claims.sub),
                _ => debug!(error = ?result.error, "Ignoring invalid bearer token"),
            }
        }
    }

    Identity::Anonymous(client_ip(headers, peer, trusted_proxies))
}

/// Client address as seen through any trusted proxies
///
/// A peer outside `trusted_proxies` is the client, whatever it claims in
/// `X-Forwarded-For`. Behind a trusted peer the hops are walked right to
/// left; the first untrusted hop wins. An unparseable hop stops the walk at
/// the last address already vouched for.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr, trusted_proxies: &[IpAddr]) -> IpAddr {
    let mut client = peer.ip();
    if !trusted_proxies.contains(&client) {
        return client;
    }

    let Some(forwarded) = headers.get(FORWARDED_FOR).and_then(|v| v.to_str().ok()) else {
        return client;
    };

    for hop in forwarded.rsplit(',') {
        let Ok(ip) = hop.trim().parse::<IpAddr>() else {
            break;
        };
        client = ip;
        if !trusted_proxies.contains(&ip) {
            break;
        }
    }

    client
}
