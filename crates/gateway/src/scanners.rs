//! Adapter wiring: the static routing table binding every
//! `(service, scan_type)` pair to its adapter or pipeline.

use std::sync::Arc;

use argus_adapters::api_discovery::ApiDiscoveryAdapter;
use argus_adapters::cloud::CloudAdapter;
use argus_adapters::dns::{DnsAdapter, DnsMode};
use argus_adapters::ffuf::FfufAdapter;
use argus_adapters::masscan::MasscanAdapter;
use argus_adapters::nmap::NmapAdapter;
use argus_adapters::nuclei::NucleiAdapter;
use argus_adapters::screenshot::ScreenshotAdapter;
use argus_adapters::subfinder::SubfinderAdapter;
use argus_adapters::testssl::TestsslAdapter;
use argus_adapters::whatweb::WhatwebAdapter;
use argus_adapters::wpscan::WpscanAdapter;
use argus_domain::config::ToolsConfig;
use argus_domain::service::Service;
use argus_engine::{Gate, Phase, Pipeline, Routine, RoutingTable, ToolAdapter};

/// Build the routing table for the served domains.
pub fn build_routing_table(tools: &ToolsConfig, services: &[Service]) -> RoutingTable {
    let masscan: Arc<dyn ToolAdapter> = Arc::new(MasscanAdapter::new(&tools.masscan));
    let nmap: Arc<dyn ToolAdapter> = Arc::new(NmapAdapter::new(&tools.nmap));
    let whatweb: Arc<dyn ToolAdapter> = Arc::new(WhatwebAdapter::new(&tools.whatweb));
    let wpscan: Arc<dyn ToolAdapter> = Arc::new(WpscanAdapter::new(&tools.wpscan));
    let ffuf: Arc<dyn ToolAdapter> =
        Arc::new(FfufAdapter::new(&tools.ffuf, &tools.wordlist_dir));
    let screenshot: Arc<dyn ToolAdapter> = Arc::new(ScreenshotAdapter::new(&tools.chromium));
    let testssl: Arc<dyn ToolAdapter> = Arc::new(TestsslAdapter::new(&tools.testssl));
    let nuclei: Arc<dyn ToolAdapter> = Arc::new(NucleiAdapter::new(&tools.nuclei));
    let cloud: Arc<dyn ToolAdapter> = Arc::new(CloudAdapter::new(
        &tools.trivy,
        &tools.prowler,
        &tools.scoutsuite,
    ));
    let subfinder: Arc<dyn ToolAdapter> = Arc::new(SubfinderAdapter::new(&tools.subfinder));
    let api_discovery: Arc<dyn ToolAdapter> = Arc::new(ApiDiscoveryAdapter::new());

    let mut table = RoutingTable::new();

    for service in services {
        match service {
            Service::Network => {
                table.add(
                    Service::Network,
                    "masscan_quick",
                    Routine::Single(masscan.clone()),
                );
                table.add(Service::Network, "nmap", Routine::Single(nmap.clone()));
                // Fast sweep first; the service probe is the point of
                // the composite, so it is a prerequisite.
                table.add(
                    Service::Network,
                    "full",
                    Routine::Pipeline(Pipeline::new(vec![
                        Phase::new("masscan", masscan.clone(), (0, 45)),
                        Phase::new("nmap", nmap.clone(), (45, 100)).required(),
                    ])),
                );
            }
            Service::Cms => {
                table.add(Service::Cms, "whatweb", Routine::Single(whatweb.clone()));
                table.add(Service::Cms, "wpscan", Routine::Single(wpscan.clone()));
                table.add(
                    Service::Cms,
                    "full",
                    Routine::Pipeline(Pipeline::new(vec![
                        Phase::new("whatweb", whatweb.clone(), (0, 40)).required(),
                        Phase::new("wpscan", wpscan.clone(), (40, 100))
                            .gated(Gate::CmsIdentified("WordPress")),
                    ])),
                );
            }
            Service::Web => {
                table.add(Service::Web, "ffuf", Routine::Single(ffuf.clone()));
                table.add(
                    Service::Web,
                    "screenshot",
                    Routine::Single(screenshot.clone()),
                );
                table.add(Service::Web, "testssl", Routine::Single(testssl.clone()));
                table.add(
                    Service::Web,
                    "full",
                    Routine::Pipeline(Pipeline::new(vec![
                        Phase::new("testssl", testssl.clone(), (0, 35)),
                        Phase::new("ffuf", ffuf.clone(), (35, 75)),
                        Phase::new("screenshot", screenshot.clone(), (75, 100)),
                    ])),
                );
            }
            Service::Recon => {
                table.add(
                    Service::Recon,
                    "dns_records",
                    Routine::Single(Arc::new(DnsAdapter::new(DnsMode::Records))),
                );
                table.add(
                    Service::Recon,
                    "dns_full",
                    Routine::Single(Arc::new(DnsAdapter::new(DnsMode::Full))),
                );
                table.add(
                    Service::Recon,
                    "dns_subdomain",
                    Routine::Single(Arc::new(DnsAdapter::new(DnsMode::Subdomains))),
                );
                table.add(
                    Service::Recon,
                    "subfinder",
                    Routine::Single(subfinder.clone()),
                );
            }
            Service::Vuln => {
                table.add(Service::Vuln, "nuclei", Routine::Single(nuclei.clone()));
            }
            Service::Cloud => {
                for scan_type in Service::Cloud.scan_types().iter().copied() {
                    table.add(Service::Cloud, scan_type, Routine::Single(cloud.clone()));
                }
            }
            Service::Api => {
                for scan_type in Service::Api.scan_types().iter().copied() {
                    table.add(Service::Api, scan_type, Routine::Single(api_discovery.clone()));
                }
            }
        }
    }

    table
}

/// Tool discriminant recorded on the scan row.
pub fn default_scanner(service: Service, scan_type: &str) -> &'static str {
    match (service, scan_type) {
        (Service::Network, "masscan_quick") => "masscan",
        (Service::Network, "nmap") => "nmap",
        (Service::Network, "full") => "pipeline",
        (Service::Cms, "whatweb") => "whatweb",
        (Service::Cms, "wpscan") => "wpscan",
        (Service::Cms, "full") => "pipeline",
        (Service::Web, "ffuf") => "ffuf",
        (Service::Web, "screenshot") => "screenshot",
        (Service::Web, "testssl") => "testssl",
        (Service::Web, "full") => "pipeline",
        (Service::Recon, "subfinder") => "subfinder",
        (Service::Recon, _) => "dns",
        (Service::Vuln, _) => "nuclei",
        (Service::Cloud, _) => "cloud",
        (Service::Api, _) => "api-discovery",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_advertised_scan_type_routes() {
        let tools = ToolsConfig::default();
        let table = build_routing_table(&tools, &Service::ALL);
        for service in Service::ALL {
            for scan_type in service.scan_types() {
                assert!(
                    table.get(service, scan_type).is_some(),
                    "missing route for {service}/{scan_type}"
                );
            }
        }
    }

    #[test]
    fn restricted_service_set_limits_routes() {
        let tools = ToolsConfig::default();
        let table = build_routing_table(&tools, &[Service::Cms]);
        assert!(table.get(Service::Cms, "full").is_some());
        assert!(table.get(Service::Network, "nmap").is_none());
    }

    #[test]
    fn cms_full_gates_wpscan_on_wordpress() {
        let tools = ToolsConfig::default();
        let table = build_routing_table(&tools, &[Service::Cms]);
        let Some(Routine::Pipeline(pipeline)) = table.get(Service::Cms, "full") else {
            panic!("cms full must be a pipeline");
        };
        assert_eq!(pipeline.phases.len(), 2);
        assert!(pipeline.phases[0].required);
        assert!(pipeline.phases[1].gate.is_some());
    }

    #[test]
    fn scanner_discriminants() {
        assert_eq!(default_scanner(Service::Network, "masscan_quick"), "masscan");
        assert_eq!(default_scanner(Service::Cms, "full"), "pipeline");
        assert_eq!(default_scanner(Service::Recon, "dns_full"), "dns");
        assert_eq!(default_scanner(Service::Api, "graphql"), "api-discovery");
    }
}
