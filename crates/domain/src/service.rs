//! The service taxonomy: which domains exist and which scan types each
//! domain accepts.
//!
//! Routing is a static table — the gateway validates `scan_type` against
//! `Service::scan_types()` before a row is ever inserted, and the engine
//! routes on the same strings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Network,
    Cms,
    Web,
    Recon,
    Vuln,
    Cloud,
    Api,
}

impl Service {
    pub const ALL: [Service; 7] = [
        Service::Network,
        Service::Cms,
        Service::Web,
        Service::Recon,
        Service::Vuln,
        Service::Cloud,
        Service::Api,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Cms => "cms",
            Self::Web => "web",
            Self::Recon => "recon",
            Self::Vuln => "vuln",
            Self::Cloud => "cloud",
            Self::Api => "api",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "network" => Some(Self::Network),
            "cms" => Some(Self::Cms),
            "web" => Some(Self::Web),
            "recon" => Some(Self::Recon),
            "vuln" => Some(Self::Vuln),
            "cloud" => Some(Self::Cloud),
            "api" => Some(Self::Api),
            _ => None,
        }
    }

    /// The scan types this service accepts. Anything else is a 400.
    pub fn scan_types(self) -> &'static [&'static str] {
        match self {
            Self::Network => &["masscan_quick", "nmap", "full"],
            Self::Cms => &["whatweb", "wpscan", "full"],
            Self::Web => &["ffuf", "screenshot", "testssl", "full"],
            Self::Recon => &["dns_records", "dns_full", "dns_subdomain", "subfinder"],
            Self::Vuln => &["nuclei"],
            Self::Cloud => &["trivy", "prowler", "scoutsuite", "image", "config", "full"],
            Self::Api => &["routes", "params", "graphql", "openapi"],
        }
    }

    pub fn accepts(self, scan_type: &str) -> bool {
        self.scan_types().contains(&scan_type)
    }

    /// Scan types whose tools take a bare host (URL targets get
    /// normalized to hostname before dispatch). URL-oriented tools
    /// receive the target verbatim.
    pub fn host_oriented(self, scan_type: &str) -> bool {
        matches!(
            (self, scan_type),
            (Self::Network, _)
                | (Self::Recon, _)
                | (Self::Web, "testssl")
                | (Self::Vuln, "nuclei")
        )
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips() {
        for svc in Service::ALL {
            assert_eq!(Service::parse(svc.as_str()), Some(svc));
        }
        assert_eq!(Service::parse("gateway"), None);
    }

    #[test]
    fn every_service_has_scan_types() {
        for svc in Service::ALL {
            assert!(!svc.scan_types().is_empty());
        }
    }

    #[test]
    fn accepts_only_listed_types() {
        assert!(Service::Network.accepts("masscan_quick"));
        assert!(Service::Cms.accepts("full"));
        assert!(!Service::Cms.accepts("masscan_quick"));
        assert!(!Service::Vuln.accepts("drupal"));
    }

    #[test]
    fn host_oriented_split() {
        assert!(Service::Network.host_oriented("nmap"));
        assert!(Service::Recon.host_oriented("dns_full"));
        assert!(Service::Web.host_oriented("testssl"));
        assert!(!Service::Web.host_oriented("ffuf"));
        assert!(!Service::Cms.host_oriented("whatweb"));
    }

    #[test]
    fn serde_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&Service::Network).unwrap(),
            "\"network\""
        );
        let svc: Service = serde_json::from_str("\"cloud\"").unwrap();
        assert_eq!(svc, Service::Cloud);
    }
}
