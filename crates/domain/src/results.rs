//! Typed result records.
//!
//! Every record an adapter emits is one of these structs. The store keeps
//! them as JSONB payloads discriminated by [`ResultKind`]; the typed shape
//! is the contract between adapters and the read path.
//!
//! The UI matches on severity casing: template vulnerabilities use
//! lower-case severities, cloud/TLS findings use upper-case. Do not
//! unify the two enums.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result kind discriminant
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Port,
    DnsRecord,
    Technology,
    CmsIdentification,
    WpSummary,
    FuzzHit,
    Screenshot,
    TlsFinding,
    Vulnerability,
    CloudFinding,
    CloudVulnerability,
    Subdomain,
    ApiRoute,
    ApiParameter,
    ApiGraphql,
    ApiOpenapi,
}

impl ResultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Port => "port",
            Self::DnsRecord => "dns_record",
            Self::Technology => "technology",
            Self::CmsIdentification => "cms_identification",
            Self::WpSummary => "wp_summary",
            Self::FuzzHit => "fuzz_hit",
            Self::Screenshot => "screenshot",
            Self::TlsFinding => "tls_finding",
            Self::Vulnerability => "vulnerability",
            Self::CloudFinding => "cloud_finding",
            Self::CloudVulnerability => "cloud_vulnerability",
            Self::Subdomain => "subdomain",
            Self::ApiRoute => "api_route",
            Self::ApiParameter => "api_parameter",
            Self::ApiGraphql => "api_graphql",
            Self::ApiOpenapi => "api_openapi",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "port" => Some(Self::Port),
            "dns_record" => Some(Self::DnsRecord),
            "technology" => Some(Self::Technology),
            "cms_identification" => Some(Self::CmsIdentification),
            "wp_summary" => Some(Self::WpSummary),
            "fuzz_hit" => Some(Self::FuzzHit),
            "screenshot" => Some(Self::Screenshot),
            "tls_finding" => Some(Self::TlsFinding),
            "vulnerability" => Some(Self::Vulnerability),
            "cloud_finding" => Some(Self::CloudFinding),
            "cloud_vulnerability" => Some(Self::CloudVulnerability),
            "subdomain" => Some(Self::Subdomain),
            "api_route" => Some(Self::ApiRoute),
            "api_parameter" => Some(Self::ApiParameter),
            "api_graphql" => Some(Self::ApiGraphql),
            "api_openapi" => Some(Self::ApiOpenapi),
            _ => None,
        }
    }
}

/// A record an adapter can persist. The associated kind ties the payload
/// shape to its discriminant at compile time.
pub trait ResultRecord: Serialize {
    const KIND: ResultKind;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Severities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lower-case severity (template vulnerability records).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Upper-case severity (cloud posture and TLS findings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FindingSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl FindingSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" | "OK" => Some(Self::Info),
            "LOW" => Some(Self::Low),
            "MEDIUM" | "WARN" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Network
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortRecord {
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_vendor: Option<String>,
}

impl ResultRecord for PortRecord {
    const KIND: ResultKind = ResultKind::Port;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DNS / recon
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecordResult {
    pub name: String,
    pub record_type: String,
    pub value: String,
}

impl ResultRecord for DnsRecordResult {
    const KIND: ResultKind = ResultKind::DnsRecord;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubdomainRecord {
    pub subdomain: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

impl ResultRecord for SubdomainRecord {
    const KIND: ResultKind = ResultKind::Subdomain;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fingerprinting / CMS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechCategory {
    Cms,
    Framework,
    Server,
    Language,
    Security,
    Info,
    Other,
}

impl TechCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cms => "cms",
            Self::Framework => "framework",
            Self::Server => "server",
            Self::Language => "language",
            Self::Security => "security",
            Self::Info => "info",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technology {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u32>,
    pub category: TechCategory,
}

impl ResultRecord for Technology {
    const KIND: ResultKind = ResultKind::Technology;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmsIdentification {
    pub cms_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub confidence: u32,
    /// Which tool made the identification.
    pub source: String,
}

impl ResultRecord for CmsIdentification {
    const KIND: ResultKind = ResultKind::CmsIdentification;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// WordPress deep scan
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WpVulnerability {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_in: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WpComponent {
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    pub outdated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerabilities: Vec<WpVulnerability>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WpSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub core_vulnerabilities: Vec<WpVulnerability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_theme: Option<WpComponent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<WpComponent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub db_exports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_backups: Vec<String>,
    pub vulnerability_count: usize,
}

impl ResultRecord for WpSummary {
    const KIND: ResultKind = ResultKind::WpSummary;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Web
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzHit {
    pub url: String,
    pub status_code: u16,
    pub content_length: u64,
    pub words: u64,
    pub lines: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl ResultRecord for FuzzHit {
    const KIND: ResultKind = ResultKind::FuzzHit;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotResult {
    pub url: String,
    /// Base64-encoded PNG.
    pub screenshot: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl ResultRecord for ScreenshotResult {
    const KIND: ResultKind = ResultKind::Screenshot;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsFinding {
    pub finding_id: String,
    pub severity: FindingSeverity,
    pub finding: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
}

impl ResultRecord for TlsFinding {
    const KIND: ResultKind = ResultKind::TlsFinding;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Vulnerability templates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub template_id: String,
    pub template_name: String,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub matched_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curl_command: Option<String>,
}

impl ResultRecord for Vulnerability {
    const KIND: ResultKind = ResultKind::Vulnerability;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cloud posture
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FindingStatus {
    Fail,
    Pass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudFinding {
    pub severity: FindingSeverity,
    pub status: FindingStatus,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compliance: Vec<String>,
    pub source: String,
}

impl ResultRecord for CloudFinding {
    const KIND: ResultKind = ResultKind::CloudFinding;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudVulnerability {
    pub vulnerability_id: String,
    pub severity: FindingSeverity,
    pub pkg_name: String,
    pub installed_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ResultRecord for CloudVulnerability {
    const KIND: ResultKind = ResultKind::CloudVulnerability;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// API surface discovery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRoute {
    pub url: String,
    pub method: String,
    pub status_code: u16,
    pub content_length: u64,
}

impl ResultRecord for ApiRoute {
    const KIND: ResultKind = ResultKind::ApiRoute;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiParameter {
    pub url: String,
    pub method: String,
    pub name: String,
    pub status_code: u16,
}

impl ResultRecord for ApiParameter {
    const KIND: ResultKind = ResultKind::ApiParameter;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlSchema {
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mutations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscriptions: Vec<String>,
}

impl ResultRecord for GraphqlSchema {
    const KIND: ResultKind = ResultKind::ApiGraphql;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiSpec {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_version: Option<String>,
    pub path_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
}

impl ResultRecord for OpenApiSpec {
    const KIND: ResultKind = ResultKind::ApiOpenapi;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips() {
        for kind in [
            ResultKind::Port,
            ResultKind::DnsRecord,
            ResultKind::Technology,
            ResultKind::CmsIdentification,
            ResultKind::WpSummary,
            ResultKind::FuzzHit,
            ResultKind::Screenshot,
            ResultKind::TlsFinding,
            ResultKind::Vulnerability,
            ResultKind::CloudFinding,
            ResultKind::CloudVulnerability,
            ResultKind::Subdomain,
            ResultKind::ApiRoute,
            ResultKind::ApiParameter,
            ResultKind::ApiGraphql,
            ResultKind::ApiOpenapi,
        ] {
            assert_eq!(ResultKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ResultKind::parse("banner"), None);
    }

    #[test]
    fn severity_casing_is_preserved() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(
            serde_json::to_string(&FindingSeverity::Critical).unwrap(),
            "\"CRITICAL\""
        );
        assert_eq!(
            serde_json::to_string(&FindingStatus::Fail).unwrap(),
            "\"FAIL\""
        );
    }

    #[test]
    fn severity_parse_is_case_insensitive() {
        assert_eq!(Severity::parse("HIGH"), Some(Severity::High));
        assert_eq!(FindingSeverity::parse("high"), Some(FindingSeverity::High));
        assert_eq!(Severity::parse("nope"), None);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Info < Severity::Low);
    }

    #[test]
    fn vulnerability_serializes_type_field() {
        let vuln = Vulnerability {
            template_id: "tid".into(),
            template_name: "t".into(),
            severity: Severity::High,
            kind: "http".into(),
            host: "example.com".into(),
            matched_at: "https://example.com/x".into(),
            description: None,
            tags: vec![],
            references: vec![],
            curl_command: None,
        };
        let json = serde_json::to_value(&vuln).unwrap();
        assert_eq!(json["type"], "http");
        assert_eq!(json["severity"], "high");
    }

    #[test]
    fn port_record_optional_fields_omitted() {
        let rec = PortRecord {
            host: "127.0.0.1".into(),
            hostname: None,
            port: 22,
            protocol: "tcp".into(),
            state: "open".into(),
            service: "unknown".into(),
            product: None,
            version: None,
            extra_info: None,
            mac_address: None,
            mac_vendor: None,
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert!(json.get("product").is_none());
        assert_eq!(json["service"], "unknown");
    }
}
