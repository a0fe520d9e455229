//! Builtin scan templates and the config fallback chain.
//!
//! A create request without an explicit config resolves, in order:
//! a user template matching the scan type, the builtin template, then
//! the service's safe default (an empty bag — every adapter config has
//! full defaults).

use argus_db::Database;
use argus_domain::service::Service;
use argus_domain::template::Template;
use serde_json::json;

/// Builtin template set for a service.
pub fn builtin_templates(service: Service) -> Vec<Template> {
    match service {
        Service::Network => vec![
            Template::builtin(
                service,
                "Quick port sweep",
                "Top ports at a polite rate",
                "masscan_quick",
                json!({ "ports": "1-1000", "rate": 1000 }),
                true,
            ),
            Template::builtin(
                service,
                "Full port sweep",
                "All TCP ports at full rate",
                "masscan_quick",
                json!({ "ports": "1-65535", "rate": 10000 }),
                false,
            ),
            Template::builtin(
                service,
                "Service detection",
                "Version probing on default ports",
                "nmap",
                json!({ "template": "quick" }),
                true,
            ),
        ],
        Service::Cms => vec![
            Template::builtin(
                service,
                "Passive fingerprint",
                "Stealthy technology fingerprinting",
                "whatweb",
                json!({ "aggression": 1 }),
                true,
            ),
            Template::builtin(
                service,
                "WordPress audit",
                "Vulnerable plugins, themes and users",
                "wpscan",
                json!({ "enumerate": ["vp", "vt", "u"], "detection_mode": "mixed" }),
                true,
            ),
        ],
        Service::Web => vec![
            Template::builtin(
                service,
                "Directory discovery",
                "Common paths with the default wordlist",
                "ffuf",
                json!({ "wordlist": "common.txt", "threads": 40 }),
                true,
            ),
            Template::builtin(
                service,
                "TLS health check",
                "Protocols, ciphers and known weaknesses",
                "testssl",
                json!({ "mode": "full" }),
                true,
            ),
        ],
        Service::Recon => vec![
            Template::builtin(
                service,
                "Record enumeration",
                "Common record types for a zone",
                "dns_records",
                json!({ "record_types": ["A", "AAAA", "CNAME", "MX", "NS", "TXT", "SOA"] }),
                true,
            ),
            Template::builtin(
                service,
                "Passive subdomains",
                "Certificate logs and passive DNS",
                "subfinder",
                json!({ "mode": "passive" }),
                true,
            ),
        ],
        Service::Vuln => vec![Template::builtin(
            service,
            "Default severity sweep",
            "Everything medium and above",
            "nuclei",
            json!({ "severity": ["critical", "high", "medium"] }),
            true,
        )],
        Service::Cloud => vec![
            Template::builtin(
                service,
                "AWS posture",
                "Prowler checks against the default profile",
                "prowler",
                json!({ "provider": "aws" }),
                true,
            ),
            Template::builtin(
                service,
                "Image vulnerabilities",
                "Trivy scan of a container image",
                "trivy",
                json!({ "provider": "docker" }),
                true,
            ),
        ],
        Service::Api => vec![
            Template::builtin(
                service,
                "Route discovery",
                "Common API route probing",
                "routes",
                json!({}),
                true,
            ),
            Template::builtin(
                service,
                "Specification hunt",
                "Swagger/OpenAPI document probing",
                "openapi",
                json!({}),
                true,
            ),
        ],
    }
}

/// Resolve the effective config bag for a create request.
pub async fn resolve_config(
    db: &Database,
    service: Service,
    scan_type: &str,
    explicit: Option<serde_json::Value>,
) -> serde_json::Value {
    if let Some(config) = explicit {
        if !config.is_null() {
            return config;
        }
    }

    // User templates win over builtins.
    match db.find_template(service, scan_type).await {
        Ok(Some(template)) => return template.arguments,
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "template lookup failed, using builtin fallback");
        }
    }

    builtin_templates(service)
        .into_iter()
        .find(|t| t.scan_type == scan_type && t.is_default)
        .map(|t| t.arguments)
        .unwrap_or_else(|| json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_reference_valid_scan_types() {
        for service in Service::ALL {
            for template in builtin_templates(service) {
                assert!(
                    service.accepts(&template.scan_type),
                    "builtin '{}' names unknown scan type '{}'",
                    template.name,
                    template.scan_type
                );
                assert!(template.arguments.is_object());
            }
        }
    }

    #[test]
    fn every_service_ships_builtins() {
        for service in Service::ALL {
            assert!(!builtin_templates(service).is_empty());
        }
    }

    #[test]
    fn at_most_one_default_per_scan_type() {
        for service in Service::ALL {
            let templates = builtin_templates(service);
            for scan_type in service.scan_types() {
                let defaults = templates
                    .iter()
                    .filter(|t| t.scan_type == *scan_type && t.is_default)
                    .count();
                assert!(defaults <= 1, "{service}/{scan_type} has {defaults} defaults");
            }
        }
    }

    #[test]
    fn builtin_fallback_matches_scan_type() {
        let found = builtin_templates(Service::Network)
            .into_iter()
            .find(|t| t.scan_type == "masscan_quick" && t.is_default)
            .unwrap();
        assert_eq!(found.arguments["rate"], 1000);
    }
}
