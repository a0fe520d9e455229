//! DNS reconnaissance — record enumeration and subdomain sweeps.
//!
//! No external binary here: lookups go through hickory-resolver against
//! the system's configured nameservers. Per-record-type failures are
//! warnings, never scan failures; an NXDOMAIN on a probe subdomain is
//! simply a miss.

use argus_domain::results::DnsRecordResult;
use argus_domain::scan::{LogLevel, Scan};
use argus_domain::target;
use argus_engine::{ScanContext, ScanError, ScanResult, ToolAdapter};
use async_trait::async_trait;
use futures_util::stream::{FuturesUnordered, StreamExt};
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::{Resolver, TokioResolver};
use serde::Deserialize;

use crate::decode_config;
use crate::wordlists::COMMON_SUBDOMAINS;

/// Upper bound on in-flight subdomain lookups.
const LOOKUP_CONCURRENCY: usize = 10;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsConfig {
    /// Record types to enumerate in records mode.
    #[serde(default = "d_record_types")]
    pub record_types: Vec<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn d_record_types() -> Vec<String> {
    ["A", "AAAA", "CNAME", "MX", "NS", "TXT", "SOA"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn parse_record_type(name: &str) -> Option<RecordType> {
    match name.to_ascii_uppercase().as_str() {
        "A" => Some(RecordType::A),
        "AAAA" => Some(RecordType::AAAA),
        "CNAME" => Some(RecordType::CNAME),
        "MX" => Some(RecordType::MX),
        "NS" => Some(RecordType::NS),
        "TXT" => Some(RecordType::TXT),
        "SOA" => Some(RecordType::SOA),
        "SRV" => Some(RecordType::SRV),
        "PTR" => Some(RecordType::PTR),
        _ => None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which sweep this adapter instance performs; routed per scan_type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsMode {
    Records,
    Subdomains,
    Full,
}

pub struct DnsAdapter {
    mode: DnsMode,
}

impl DnsAdapter {
    pub fn new(mode: DnsMode) -> Self {
        Self { mode }
    }

    fn resolver() -> TokioResolver {
        Resolver::builder_with_config(
            ResolverConfig::default(),
            TokioConnectionProvider::default(),
        )
        .build()
    }

    async fn enumerate_records(
        &self,
        ctx: &ScanContext,
        resolver: &TokioResolver,
        domain: &str,
        record_types: &[String],
    ) -> ScanResult<usize> {
        let mut found = 0usize;
        let total = record_types.len().max(1);

        for (index, type_name) in record_types.iter().enumerate() {
            ctx.checkpoint()?;

            let Some(record_type) = parse_record_type(type_name) else {
                ctx.log(
                    LogLevel::Warning,
                    format!("unknown record type '{type_name}', skipping"),
                )
                .await;
                continue;
            };

            match resolver.lookup(domain, record_type).await {
                Ok(lookup) => {
                    for rdata in lookup.iter() {
                        let record = DnsRecordResult {
                            name: domain.to_owned(),
                            record_type: record_type.to_string(),
                            value: rdata.to_string(),
                        };
                        ctx.append(&record).await?;
                        found += 1;
                    }
                }
                Err(e) => {
                    // NXDOMAIN / no records for a type is expected noise.
                    ctx.log(
                        LogLevel::Warning,
                        format!("{record_type} lookup for {domain} failed: {e}"),
                    )
                    .await;
                }
            }

            ctx.progress((100 * (index + 1) / total) as u8).await;
        }

        Ok(found)
    }

    async fn sweep_subdomains(
        &self,
        ctx: &ScanContext,
        resolver: &TokioResolver,
        domain: &str,
    ) -> ScanResult<usize> {
        let mut found = 0usize;
        let total = COMMON_SUBDOMAINS.len();
        let mut completed = 0usize;

        let mut pending = COMMON_SUBDOMAINS.iter().copied();
        let mut in_flight = FuturesUnordered::new();

        let lookup = |label: &'static str| {
            let fqdn = format!("{label}.{domain}");
            async move {
                let result = resolver.lookup_ip(fqdn.as_str()).await;
                (fqdn, result)
            }
        };

        for label in pending.by_ref().take(LOOKUP_CONCURRENCY) {
            in_flight.push(lookup(label));
        }

        while let Some((fqdn, result)) = in_flight.next().await {
            ctx.checkpoint()?;
            completed += 1;

            if let Ok(ips) = result {
                if let Some(ip) = ips.iter().next() {
                    let record = DnsRecordResult {
                        name: fqdn.clone(),
                        record_type: "SUBDOMAIN".into(),
                        value: ip.to_string(),
                    };
                    ctx.append(&record).await?;
                    found += 1;
                    ctx.log(LogLevel::Success, format!("subdomain found: {fqdn} → {ip}"))
                        .await;
                }
            }

            if let Some(label) = pending.next() {
                in_flight.push(lookup(label));
            }

            if completed % 10 == 0 {
                ctx.progress((100 * completed / total) as u8).await;
            }
        }

        Ok(found)
    }
}

#[async_trait]
impl ToolAdapter for DnsAdapter {
    fn name(&self) -> &'static str {
        "dns"
    }

    async fn scan(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()> {
        let config: DnsConfig = decode_config(&scan.configuration)?;
        let domain = target::normalize_host(&scan.target);
        if domain.is_empty() || domain.contains('/') || domain.contains(' ') {
            return Err(ScanError::Config(format!(
                "'{}' is not a resolvable domain",
                scan.target
            )));
        }

        let resolver = Self::resolver();

        let (records, subdomains) = match self.mode {
            DnsMode::Records => {
                ctx.log(LogLevel::Info, format!("enumerating DNS records for {domain}"))
                    .await;
                let n = self
                    .enumerate_records(ctx, &resolver, &domain, &config.record_types)
                    .await?;
                (n, 0)
            }
            DnsMode::Subdomains => {
                ctx.log(LogLevel::Info, format!("sweeping subdomains of {domain}"))
                    .await;
                let n = self.sweep_subdomains(ctx, &resolver, &domain).await?;
                (0, n)
            }
            DnsMode::Full => {
                ctx.log(LogLevel::Info, format!("full DNS reconnaissance of {domain}"))
                    .await;
                let record_ctx = ctx.sub_band(0, 50);
                let records = self
                    .enumerate_records(&record_ctx, &resolver, &domain, &config.record_types)
                    .await?;
                ctx.checkpoint()?;
                let sweep_ctx = ctx.sub_band(50, 100);
                let subdomains = self.sweep_subdomains(&sweep_ctx, &resolver, &domain).await?;
                (records, subdomains)
            }
        };

        ctx.log(
            LogLevel::Info,
            format!(
                "DNS reconnaissance finished: {records} records, {subdomains} subdomains"
            ),
        )
        .await;
        ctx.progress(100).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_record_types_cover_the_basics() {
        let config: DnsConfig = decode_config(&serde_json::json!({})).unwrap();
        for expected in ["A", "MX", "NS", "TXT"] {
            assert!(config.record_types.iter().any(|t| t == expected));
        }
    }

    #[test]
    fn record_type_parsing() {
        assert_eq!(parse_record_type("a"), Some(RecordType::A));
        assert_eq!(parse_record_type("MX"), Some(RecordType::MX));
        assert_eq!(parse_record_type("srv"), Some(RecordType::SRV));
        assert_eq!(parse_record_type("AXFR"), None);
    }

    #[test]
    fn config_rejects_unknown_fields() {
        let err = decode_config::<DnsConfig>(&serde_json::json!({ "rate": 1 })).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn custom_record_types_accepted() {
        let config: DnsConfig =
            decode_config(&serde_json::json!({ "record_types": ["A", "PTR"] })).unwrap();
        assert_eq!(config.record_types, vec!["A", "PTR"]);
    }
}
