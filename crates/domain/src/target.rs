//! Target normalization.
//!
//! Handlers strip surrounding whitespace from every target. Host-oriented
//! tools (port scanners, DNS) additionally get URL targets reduced to the
//! host component. CIDR ranges, comma-separated lists, and space-separated
//! lists pass through verbatim — the external tools consume those natively.

/// Strip whitespace and, when the target is a URL, reduce it to its host.
///
/// `https://user@example.com:8443/path/` → `example.com`
pub fn normalize_host(target: &str) -> String {
    let trimmed = target.trim();
    let rest = match trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
    {
        Some(rest) => rest,
        None => return trimmed.to_owned(),
    };

    let authority = rest.split('/').next().unwrap_or(rest);
    // Drop userinfo, then a trailing :port.
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host);
    host.trim_end_matches('/').to_owned()
}

/// Whitespace-trimmed target, otherwise verbatim (URL-oriented tools).
pub fn normalize_verbatim(target: &str) -> String {
    target.trim().to_owned()
}

/// `host:port` pair for TLS-style tools; appends the default port when
/// the target carries none.
pub fn host_port(target: &str, default_port: u16) -> String {
    let host = normalize_host(target);
    if host.contains(':') {
        host
    } else {
        format!("{host}:{default_port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_passes_through() {
        assert_eq!(normalize_host("example.com"), "example.com");
        assert_eq!(normalize_host("  10.0.0.1  "), "10.0.0.1");
    }

    #[test]
    fn url_reduced_to_host() {
        assert_eq!(normalize_host("https://example.com/"), "example.com");
        assert_eq!(normalize_host("http://example.com/a/b"), "example.com");
        assert_eq!(normalize_host("https://example.com:8443/x"), "example.com");
        assert_eq!(normalize_host("https://admin@example.com/"), "example.com");
    }

    #[test]
    fn lists_and_cidr_pass_verbatim() {
        assert_eq!(normalize_host("10.0.0.0/24"), "10.0.0.0/24");
        assert_eq!(normalize_host("a.com,b.com"), "a.com,b.com");
        assert_eq!(normalize_host("a.com b.com"), "a.com b.com");
    }

    #[test]
    fn host_port_appends_default() {
        assert_eq!(host_port("example.com", 443), "example.com:443");
        assert_eq!(host_port("example.com:8443", 443), "example.com:8443");
        assert_eq!(host_port("https://example.com/", 443), "example.com:443");
    }

    #[test]
    fn verbatim_only_trims() {
        assert_eq!(
            normalize_verbatim(" https://example.com/path "),
            "https://example.com/path"
        );
    }
}
