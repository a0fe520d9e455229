//! Service-probing port scanner (nmap).
//!
//! Drives nmap with normal output on stdout and parses it as it streams:
//! scan-report headers open a host, port-table rows accumulate onto it,
//! and a MAC address line (local subnets only) annotates it. The host's
//! records are flushed when the next report header arrives or the output
//! ends, so the MAC can be attached to every port of the host.

use argus_domain::results::PortRecord;
use argus_domain::scan::{LogLevel, Scan};
use argus_domain::target;
use argus_engine::exec::{self, OutputLine, ToolCommand};
use argus_engine::{ScanContext, ScanError, ScanResult, ToolAdapter};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::decode_config;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NmapConfig {
    /// Free-form nmap arguments. Wins over `template`.
    #[serde(default)]
    pub args: Option<String>,
    /// Named argument preset.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl NmapConfig {
    /// Resolve the argument list: explicit args, then a named preset,
    /// then plain service detection.
    pub fn resolve_args(&self) -> Vec<String> {
        if let Some(args) = &self.args {
            return args.split_whitespace().map(str::to_owned).collect();
        }
        let preset = match self.template.as_deref() {
            Some("quick") => "-T4 -F",
            Some("intense") => "-T4 -A -v",
            Some("ping") => "-sn",
            _ => "-sV",
        };
        preset.split_whitespace().map(str::to_owned).collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Normal-output parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn report_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Nmap scan report for (?:(\S+) \(([^)]+)\)|(\S+))$").unwrap()
    })
}

fn port_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+)/(tcp|udp)\s+(\S+)\s+(\S+)(?:\s+(.+))?$").unwrap()
    })
}

fn mac_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^MAC Address: ([0-9A-Fa-f:]{17})(?: \(([^)]+)\))?$").unwrap()
    })
}

/// A host being assembled from consecutive output lines.
#[derive(Debug, Default, Clone)]
pub struct HostBlock {
    pub host: String,
    pub hostname: Option<String>,
    pub mac_address: Option<String>,
    pub mac_vendor: Option<String>,
    pub ports: Vec<(u16, String, String, String, Option<String>)>,
}

impl HostBlock {
    pub fn into_records(self) -> Vec<PortRecord> {
        let HostBlock {
            host,
            hostname,
            mac_address,
            mac_vendor,
            ports,
        } = self;
        ports
            .into_iter()
            .map(|(port, protocol, state, service, version_field)| {
                let (product, version, extra_info) =
                    split_version_field(version_field.as_deref());
                PortRecord {
                    host: host.clone(),
                    hostname: hostname.clone(),
                    port,
                    protocol,
                    state,
                    service,
                    product,
                    version,
                    extra_info,
                    mac_address: mac_address.clone(),
                    mac_vendor: mac_vendor.clone(),
                }
            })
            .collect()
    }
}

/// What one line of nmap normal output means.
pub enum NmapLine {
    HostStart { host: String, hostname: Option<String> },
    Port {
        port: u16,
        protocol: String,
        state: String,
        service: String,
        version_field: Option<String>,
    },
    Mac { address: String, vendor: Option<String> },
    Other,
}

pub fn parse_line(line: &str) -> NmapLine {
    let line = line.trim_end();
    if let Some(caps) = report_pattern().captures(line) {
        // Either "hostname (ip)" or a bare address.
        return match (caps.get(1), caps.get(2), caps.get(3)) {
            (Some(name), Some(ip), _) => NmapLine::HostStart {
                host: ip.as_str().to_owned(),
                hostname: Some(name.as_str().to_owned()),
            },
            (_, _, Some(addr)) => NmapLine::HostStart {
                host: addr.as_str().to_owned(),
                hostname: None,
            },
            _ => NmapLine::Other,
        };
    }
    if let Some(caps) = port_pattern().captures(line) {
        return NmapLine::Port {
            port: caps[1].parse().unwrap_or(0),
            protocol: caps[2].to_owned(),
            state: caps[3].to_owned(),
            service: caps[4].to_owned(),
            version_field: caps.get(5).map(|m| m.as_str().trim().to_owned()),
        };
    }
    if let Some(caps) = mac_pattern().captures(line) {
        return NmapLine::Mac {
            address: caps[1].to_uppercase(),
            vendor: caps.get(2).map(|m| m.as_str().to_owned()),
        };
    }
    NmapLine::Other
}

/// Split nmap's VERSION column into (product, version, extra_info).
///
/// `OpenSSH 8.2p1 Ubuntu (Ubuntu Linux; protocol 2.0)` →
/// `(OpenSSH, 8.2p1 Ubuntu, Ubuntu Linux; protocol 2.0)`
pub fn split_version_field(
    field: Option<&str>,
) -> (Option<String>, Option<String>, Option<String>) {
    let Some(field) = field else {
        return (None, None, None);
    };
    let field = field.trim();
    if field.is_empty() {
        return (None, None, None);
    }

    let (main, extra) = match field.split_once('(') {
        Some((main, rest)) => (
            main.trim(),
            Some(rest.trim_end_matches(')').trim().to_owned()),
        ),
        None => (field, None),
    };

    let tokens: Vec<&str> = main.split_whitespace().collect();
    let version_start = tokens
        .iter()
        .position(|t| t.chars().next().is_some_and(|c| c.is_ascii_digit()));

    match version_start {
        Some(0) => (None, Some(tokens.join(" ")), extra),
        Some(idx) => (
            Some(tokens[..idx].join(" ")),
            Some(tokens[idx..].join(" ")),
            extra,
        ),
        None if tokens.is_empty() => (None, None, extra),
        None => (Some(tokens.join(" ")), None, extra),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct NmapAdapter {
    binary: String,
}

impl NmapAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn flush_host(
        &self,
        ctx: &ScanContext,
        block: HostBlock,
        emitted: &mut usize,
    ) -> ScanResult<()> {
        let host = block.host.clone();
        let records = block.into_records();
        for record in &records {
            ctx.append(record).await?;
            *emitted += 1;
        }
        if !records.is_empty() {
            ctx.log(
                LogLevel::Success,
                format!("{}: {} ports recorded", host, records.len()),
            )
            .await;
        }
        Ok(())
    }
}

#[async_trait]
impl ToolAdapter for NmapAdapter {
    fn name(&self) -> &'static str {
        "nmap"
    }

    fn binary(&self) -> Option<&str> {
        Some(&self.binary)
    }

    async fn scan(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()> {
        let config: NmapConfig = decode_config(&scan.configuration)?;
        // URL targets are reduced to hostname before invocation.
        let host = target::normalize_host(&scan.target);

        let cmd = ToolCommand::new(&self.binary)
            .args(config.resolve_args())
            .arg("-oN")
            .arg("-")
            .arg(&host);

        ctx.log(LogLevel::Info, format!("running: {}", cmd.display_redacted()))
            .await;
        ctx.progress(5).await;

        let mut run = exec::spawn(&cmd, ctx.cancel_token().clone(), ctx.remaining())?;

        let mut current: Option<HostBlock> = None;
        let mut emitted = 0usize;
        let mut saw_output = false;

        while let Some(line) = run.next_line().await {
            ctx.checkpoint()?;
            match line {
                OutputLine::Stdout(text) => {
                    saw_output = true;
                    match parse_line(&text) {
                        NmapLine::HostStart { host, hostname } => {
                            if let Some(block) = current.take() {
                                self.flush_host(ctx, block, &mut emitted).await?;
                            }
                            ctx.log(LogLevel::Info, format!("scanning host {host}")).await;
                            current = Some(HostBlock {
                                host,
                                hostname,
                                ..HostBlock::default()
                            });
                            ctx.progress(30).await;
                        }
                        NmapLine::Port {
                            port,
                            protocol,
                            state,
                            service,
                            version_field,
                        } => {
                            if let Some(block) = current.as_mut() {
                                block.ports.push((port, protocol, state, service, version_field));
                            }
                            ctx.progress(60).await;
                        }
                        NmapLine::Mac { address, vendor } => {
                            if let Some(block) = current.as_mut() {
                                block.mac_address = Some(address);
                                block.mac_vendor = vendor;
                            }
                        }
                        NmapLine::Other => {}
                    }
                }
                OutputLine::Stderr(text) => {
                    if exec::stderr_is_noteworthy(&text) {
                        ctx.log(LogLevel::Warning, text).await;
                    }
                }
            }
        }

        if let Some(block) = current.take() {
            self.flush_host(ctx, block, &mut emitted).await?;
        }

        let code = run.finish().await?;
        if !saw_output {
            return Err(ScanError::Tool(format!(
                "nmap produced no output (exit code {})",
                code.map_or_else(|| "signal".into(), |c| c.to_string())
            )));
        }

        ctx.log(
            LogLevel::Info,
            format!("nmap finished: {emitted} port records for {host}"),
        )
        .await;
        ctx.progress(100).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Starting Nmap 7.94 ( https://nmap.org )
Nmap scan report for router.lan (192.168.1.1)
Host is up (0.0010s latency).
PORT     STATE SERVICE VERSION
22/tcp   open  ssh     OpenSSH 8.2p1 Ubuntu (Ubuntu Linux; protocol 2.0)
80/tcp   open  http    nginx 1.18.0
443/tcp  open  https
MAC Address: AA:BB:CC:DD:EE:FF (Acme Networks)
Nmap done: 1 IP address (1 host up) scanned in 8.31 seconds";

    fn assemble(text: &str) -> Vec<PortRecord> {
        let mut current: Option<HostBlock> = None;
        let mut records = Vec::new();
        for line in text.lines() {
            match parse_line(line) {
                NmapLine::HostStart { host, hostname } => {
                    if let Some(block) = current.take() {
                        records.extend(block.into_records());
                    }
                    current = Some(HostBlock {
                        host,
                        hostname,
                        ..HostBlock::default()
                    });
                }
                NmapLine::Port {
                    port,
                    protocol,
                    state,
                    service,
                    version_field,
                } => {
                    if let Some(block) = current.as_mut() {
                        block.ports.push((port, protocol, state, service, version_field));
                    }
                }
                NmapLine::Mac { address, vendor } => {
                    if let Some(block) = current.as_mut() {
                        block.mac_address = Some(address);
                        block.mac_vendor = vendor;
                    }
                }
                NmapLine::Other => {}
            }
        }
        if let Some(block) = current.take() {
            records.extend(block.into_records());
        }
        records
    }

    #[test]
    fn parses_full_report() {
        let records = assemble(SAMPLE);
        assert_eq!(records.len(), 3);

        let ssh = &records[0];
        assert_eq!(ssh.host, "192.168.1.1");
        assert_eq!(ssh.hostname.as_deref(), Some("router.lan"));
        assert_eq!(ssh.port, 22);
        assert_eq!(ssh.service, "ssh");
        assert_eq!(ssh.product.as_deref(), Some("OpenSSH"));
        assert_eq!(ssh.version.as_deref(), Some("8.2p1 Ubuntu"));
        assert_eq!(ssh.extra_info.as_deref(), Some("Ubuntu Linux; protocol 2.0"));
        assert_eq!(ssh.mac_address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(ssh.mac_vendor.as_deref(), Some("Acme Networks"));

        let https = &records[2];
        assert_eq!(https.port, 443);
        assert!(https.product.is_none());
        assert!(https.version.is_none());
    }

    #[test]
    fn report_without_hostname() {
        match parse_line("Nmap scan report for 10.0.0.5") {
            NmapLine::HostStart { host, hostname } => {
                assert_eq!(host, "10.0.0.5");
                assert!(hostname.is_none());
            }
            _ => panic!("expected host start"),
        }
    }

    #[test]
    fn version_field_splitting() {
        assert_eq!(
            split_version_field(Some("nginx 1.18.0")),
            (Some("nginx".into()), Some("1.18.0".into()), None)
        );
        assert_eq!(
            split_version_field(Some("Apache httpd 2.4.52 ((Ubuntu))")),
            (
                Some("Apache httpd".into()),
                Some("2.4.52".into()),
                Some("(Ubuntu".into())
            )
        );
        assert_eq!(split_version_field(None), (None, None, None));
        assert_eq!(
            split_version_field(Some("Dropbear sshd")),
            (Some("Dropbear sshd".into()), None, None)
        );
    }

    #[test]
    fn config_arg_resolution() {
        let explicit: NmapConfig =
            decode_config(&serde_json::json!({ "args": "-sS -p 1-1000" })).unwrap();
        assert_eq!(explicit.resolve_args(), vec!["-sS", "-p", "1-1000"]);

        let preset: NmapConfig =
            decode_config(&serde_json::json!({ "template": "quick" })).unwrap();
        assert_eq!(preset.resolve_args(), vec!["-T4", "-F"]);

        let default: NmapConfig = decode_config(&serde_json::json!({})).unwrap();
        assert_eq!(default.resolve_args(), vec!["-sV"]);
    }

    #[test]
    fn filtered_ports_keep_their_state() {
        match parse_line("8080/tcp filtered http-proxy") {
            NmapLine::Port { state, service, .. } => {
                assert_eq!(state, "filtered");
                assert_eq!(service, "http-proxy");
            }
            _ => panic!("expected port line"),
        }
    }
}
