//! Web fuzzer (ffuf).
//!
//! Streams ffuf's NDJSON hit output and emits one fuzz-hit record per
//! line. The fuzz position is marked with a FUZZ token in the URL; when
//! the request URL carries none, `/FUZZ` is appended.

use argus_domain::results::FuzzHit;
use argus_domain::scan::{LogLevel, Scan};
use argus_engine::exec::{self, OutputLine, ToolCommand};
use argus_engine::{ScanContext, ScanError, ScanResult, ToolAdapter};
use async_trait::async_trait;
use serde::Deserialize;

use crate::decode_config;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FfufConfig {
    /// URL to fuzz; defaults to the scan target. `/FUZZ` is appended
    /// when no FUZZ token is present.
    #[serde(default)]
    pub url: Option<String>,
    /// Wordlist file name, resolved against the configured wordlist
    /// directory unless absolute.
    #[serde(default = "d_wordlist")]
    pub wordlist: String,
    #[serde(default = "d_method")]
    pub method: String,
    #[serde(default = "d_threads")]
    pub threads: u16,
    /// Status codes that count as hits.
    #[serde(default = "d_match_codes")]
    pub match_codes: Vec<u16>,
    /// Extensions appended to every word (e.g. ".php").
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub recursion: bool,
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn d_wordlist() -> String {
    "common.txt".into()
}

fn d_method() -> String {
    "GET".into()
}

fn d_threads() -> u16 {
    40
}

fn d_match_codes() -> Vec<u16> {
    vec![200, 204, 301, 302, 307, 401, 403, 405]
}

/// The URL actually handed to ffuf, FUZZ token guaranteed.
pub fn fuzz_url(target: &str, configured: Option<&str>) -> String {
    let base = configured.unwrap_or(target).trim();
    if base.contains("FUZZ") {
        return base.to_owned();
    }
    format!("{}/FUZZ", base.trim_end_matches('/'))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// NDJSON hit lines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct HitLine {
    url: String,
    status: u16,
    length: u64,
    words: u64,
    lines: u64,
    #[serde(rename = "content-type", default)]
    content_type: Option<String>,
    #[serde(rename = "redirectlocation", default)]
    redirect_location: Option<String>,
}

pub fn parse_hit_line(line: &str) -> Option<FuzzHit> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let hit: HitLine = serde_json::from_str(trimmed).ok()?;
    Some(FuzzHit {
        url: hit.url,
        status_code: hit.status,
        content_length: hit.length,
        words: hit.words,
        lines: hit.lines,
        content_type: hit.content_type.filter(|s| !s.is_empty()),
        redirect_url: hit.redirect_location.filter(|s| !s.is_empty()),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FfufAdapter {
    binary: String,
    wordlist_dir: String,
}

impl FfufAdapter {
    pub fn new(binary: impl Into<String>, wordlist_dir: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            wordlist_dir: wordlist_dir.into(),
        }
    }

    fn resolve_wordlist(&self, name: &str) -> String {
        if name.starts_with('/') {
            name.to_owned()
        } else {
            format!("{}/{}", self.wordlist_dir.trim_end_matches('/'), name)
        }
    }
}

#[async_trait]
impl ToolAdapter for FfufAdapter {
    fn name(&self) -> &'static str {
        "ffuf"
    }

    fn binary(&self) -> Option<&str> {
        Some(&self.binary)
    }

    async fn scan(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()> {
        let config: FfufConfig = decode_config(&scan.configuration)?;
        let url = fuzz_url(&scan.target, config.url.as_deref());

        let codes = config
            .match_codes
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut cmd = ToolCommand::new(&self.binary)
            .arg("-u")
            .arg(&url)
            .arg("-w")
            .arg(self.resolve_wordlist(&config.wordlist))
            .arg("-X")
            .arg(config.method.to_uppercase())
            .arg("-t")
            .arg(config.threads.to_string())
            .arg("-mc")
            .arg(codes)
            .arg("-json");
        if !config.extensions.is_empty() {
            cmd = cmd.arg("-e").arg(config.extensions.join(","));
        }
        if config.recursion {
            cmd = cmd.arg("-recursion");
        }

        ctx.log(LogLevel::Info, format!("running: {}", cmd.display_redacted()))
            .await;
        ctx.progress(5).await;

        let mut run = exec::spawn(&cmd, ctx.cancel_token().clone(), ctx.remaining())?;

        let mut hits = 0usize;
        while let Some(line) = run.next_line().await {
            ctx.checkpoint()?;
            match line {
                OutputLine::Stdout(text) => {
                    if let Some(hit) = parse_hit_line(&text) {
                        ctx.log(
                            LogLevel::Success,
                            format!("{} [{}] {} bytes", hit.url, hit.status_code, hit.content_length),
                        )
                        .await;
                        ctx.append(&hit).await?;
                        hits += 1;
                        ctx.progress((10 + hits * 2).min(90) as u8).await;
                    }
                }
                OutputLine::Stderr(text) => {
                    if exec::stderr_is_noteworthy(&text) {
                        ctx.log(LogLevel::Warning, text).await;
                    }
                }
            }
        }

        let code = run.finish().await?;
        if hits == 0 && code.unwrap_or(0) != 0 {
            return Err(ScanError::Tool(format!(
                "ffuf produced no output (exit code {})",
                code.map_or_else(|| "signal".into(), |c| c.to_string())
            )));
        }

        ctx.log(LogLevel::Info, format!("ffuf finished: {hits} hits on {url}"))
            .await;
        ctx.progress(100).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuzz_token_appended_when_missing() {
        assert_eq!(
            fuzz_url("https://example.com", None),
            "https://example.com/FUZZ"
        );
        assert_eq!(
            fuzz_url("https://example.com/", None),
            "https://example.com/FUZZ"
        );
    }

    #[test]
    fn explicit_fuzz_token_is_preserved() {
        assert_eq!(
            fuzz_url("https://example.com/api/FUZZ/detail", None),
            "https://example.com/api/FUZZ/detail"
        );
        assert_eq!(
            fuzz_url("https://a.example", Some("https://b.example/FUZZ")),
            "https://b.example/FUZZ"
        );
    }

    #[test]
    fn parses_hit_line() {
        let line = r#"{"input":{"FUZZ":"admin"},"position":17,"status":301,"length":162,"words":8,"lines":9,"content-type":"text/html","redirectlocation":"https://example.com/admin/","url":"https://example.com/admin","host":"example.com"}"#;
        let hit = parse_hit_line(line).unwrap();
        assert_eq!(hit.url, "https://example.com/admin");
        assert_eq!(hit.status_code, 301);
        assert_eq!(hit.content_length, 162);
        assert_eq!(hit.words, 8);
        assert_eq!(hit.lines, 9);
        assert_eq!(hit.content_type.as_deref(), Some("text/html"));
        assert_eq!(
            hit.redirect_url.as_deref(),
            Some("https://example.com/admin/")
        );
    }

    #[test]
    fn empty_optional_fields_become_none() {
        let line = r#"{"url":"https://example.com/x","status":200,"length":5,"words":1,"lines":1,"content-type":"","redirectlocation":""}"#;
        let hit = parse_hit_line(line).unwrap();
        assert!(hit.content_type.is_none());
        assert!(hit.redirect_url.is_none());
    }

    #[test]
    fn non_hit_lines_are_skipped() {
        assert!(parse_hit_line(":: Progress: [4614/4614]").is_none());
        assert!(parse_hit_line("").is_none());
    }

    #[test]
    fn config_defaults() {
        let config: FfufConfig = decode_config(&serde_json::json!({})).unwrap();
        assert_eq!(config.wordlist, "common.txt");
        assert_eq!(config.method, "GET");
        assert_eq!(config.threads, 40);
        assert!(config.match_codes.contains(&403));
        assert!(!config.recursion);
    }

    #[test]
    fn wordlist_resolution() {
        let adapter = FfufAdapter::new("/usr/local/bin/ffuf", "/usr/share/wordlists");
        assert_eq!(
            adapter.resolve_wordlist("common.txt"),
            "/usr/share/wordlists/common.txt"
        );
        assert_eq!(
            adapter.resolve_wordlist("/opt/lists/big.txt"),
            "/opt/lists/big.txt"
        );
    }
}
