//! Shared share-link URI parsing helpers
//!
//! Share links are close to, but not quite, RFC 3986 URIs: credentials may
//! hold unencoded reserved characters and hosts may be bare IPv6 literals.
//! These helpers are tolerant where the wild formats are sloppy and strict
//! on the fields the model validates (ports in particular).

use percent_encoding::percent_decode_str;

/// Decomposed share link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriParts {
    /// Lowercased scheme
    pub scheme: String,
    /// Raw userinfo (text before the last `@`), if any
    pub userinfo: Option<String>,
    /// Host, brackets stripped from IPv6 literals
    pub host: String,
    /// Port, validated to [1, 65535]
    pub port: u16,
    /// Query pairs with percent-decoded values, in order
    pub query: Vec<(String, String)>,
    /// Percent-decoded fragment
    pub fragment: Option<String>,
}

impl UriParts {
    /// First value for a query key
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Split a line into `(scheme, rest)` at `://`
pub fn split_scheme(line: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = line.split_once("://")?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some((scheme, rest))
}

/// Parse a `userinfo@host:port?query#fragment` share link
pub fn parse(line: &str) -> Option<UriParts> {
    let (scheme, rest) = split_scheme(line.trim())?;

    let (rest, fragment) = match rest.split_once('#') {
        Some((rest, fragment)) => (rest, Some(decode(fragment))),
        None => (rest, None),
    };

    let (authority, query_str) = match rest.split_once('?') {
        Some((authority, query)) => (authority, Some(query)),
        None => (rest, None),
    };

    // Credentials may themselves contain '@'; the host starts after the
    // last one.
    let (userinfo, host_port) = match authority.rsplit_once('@') {
        Some((userinfo, host_port)) => (Some(userinfo.to_string()), host_port),
        None => (None, authority),
    };

    let (host, port) = split_host_port(host_port)?;

    let query = query_str
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| match pair.split_once('=') {
                    Some((k, v)) => (k.to_string(), decode(v)),
                    None => (pair.to_string(), String::new()),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(UriParts {
        scheme: scheme.to_ascii_lowercase(),
        userinfo,
        host,
        port,
        query,
        fragment: fragment.filter(|f| !f.is_empty()),
    })
}

/// Split `host:port`, handling bracketed IPv6 literals; ports outside
/// [1, 65535] are rejected
pub fn split_host_port(input: &str) -> Option<(String, u16)> {
    let input = input.trim_end_matches('/');
    let (host, port_str) = if let Some(stripped) = input.strip_prefix('[') {
        let (host, rest) = stripped.split_once(']')?;
        (host.to_string(), rest.strip_prefix(':')?)
    } else {
        let (host, port) = input.rsplit_once(':')?;
        (host.to_string(), port)
    };

    if host.is_empty() {
        return None;
    }
    let port: u16 = port_str.parse().ok()?;
    if port == 0 {
        return None;
    }
    Some((host, port))
}

/// Percent-decode, passing undecodable input through untouched
pub fn decode(input: &str) -> String {
    percent_decode_str(input)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| input.to_string())
}
