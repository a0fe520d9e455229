//! Visual recon — headless-browser screenshots per URL.
//!
//! Each URL gets its own chromium invocation writing a PNG into a
//! scratch directory; the bytes are stored base64-encoded on the result
//! record. Page title and HTTP status come from a plain GET alongside
//! the capture. A URL that fails to render is a warning, not a scan
//! failure.

use std::sync::OnceLock;
use std::time::Duration;

use argus_domain::results::ScreenshotResult;
use argus_domain::scan::{LogLevel, Scan};
use argus_engine::exec::{self, ToolCommand};
use argus_engine::{ScanContext, ScanError, ScanResult, ToolAdapter};
use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use serde::Deserialize;

use crate::decode_config;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScreenshotConfig {
    /// URLs to capture; defaults to the scan target.
    #[serde(default)]
    pub urls: Vec<String>,
    /// Per-URL capture timeout in seconds.
    #[serde(default = "d_per_url_timeout")]
    pub per_url_timeout: u64,
    /// Viewport `WIDTHxHEIGHT`.
    #[serde(default = "d_resolution")]
    pub resolution: String,
    /// Capture with an extended viewport height.
    #[serde(default)]
    pub full_page: bool,
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn d_per_url_timeout() -> u64 {
    30
}

fn d_resolution() -> String {
    "1440x900".into()
}

/// Parse `WIDTHxHEIGHT`, falling back to the default viewport.
pub fn parse_resolution(resolution: &str) -> (u32, u32) {
    let parsed = resolution
        .split_once('x')
        .and_then(|(w, h)| Some((w.trim().parse().ok()?, h.trim().parse().ok()?)));
    match parsed {
        Some((w, h)) if w > 0 && h > 0 => (w, h),
        _ => (1440, 900),
    }
}

fn title_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap())
}

pub fn extract_title(html: &str) -> Option<String> {
    let title = title_pattern().captures(html)?.get(1)?.as_str().trim().to_owned();
    (!title.is_empty()).then_some(title)
}

/// URLs that tools expecting a scheme can open.
pub fn ensure_scheme(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ScreenshotAdapter {
    chromium: String,
}

impl ScreenshotAdapter {
    pub fn new(chromium: impl Into<String>) -> Self {
        Self { chromium: chromium.into() }
    }

    /// Best-effort page metadata: final status code and `<title>`.
    async fn fetch_metadata(&self, url: &str) -> (Option<u16>, Option<String>) {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(true)
            .build()
        {
            Ok(client) => client,
            Err(_) => return (None, None),
        };

        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let title = response.text().await.ok().and_then(|html| extract_title(&html));
                (Some(status), title)
            }
            Err(_) => (None, None),
        }
    }

    async fn capture(
        &self,
        ctx: &ScanContext,
        url: &str,
        config: &ScreenshotConfig,
    ) -> ScanResult<Option<ScreenshotResult>> {
        let scratch = tempfile::tempdir()
            .map_err(|e| ScanError::Tool(format!("scratch dir: {e}")))?;
        let output = scratch.path().join("capture.png");

        let (width, height) = parse_resolution(&config.resolution);
        let height = if config.full_page { height.max(4000) } else { height };

        let cmd = ToolCommand::new(&self.chromium)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--hide-scrollbars")
            .arg(format!("--window-size={width},{height}"))
            .arg(format!("--screenshot={}", output.display()))
            .arg(url);

        let per_url = Duration::from_secs(config.per_url_timeout).min(ctx.remaining());
        let run = exec::spawn(&cmd, ctx.cancel_token().clone(), per_url)?;

        // Chromium narrates plenty; only the exit matters here.
        match run.wait().await? {
            exec::ExitKind::Cancelled => return Err(ScanError::Cancelled),
            exec::ExitKind::TimedOut => {
                ctx.log(LogLevel::Warning, format!("capture of {url} timed out"))
                    .await;
                return Ok(None);
            }
            exec::ExitKind::Finished(_) => {}
        }

        let bytes = match tokio::fs::read(&output).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            _ => {
                ctx.log(LogLevel::Warning, format!("no screenshot produced for {url}"))
                    .await;
                return Ok(None);
            }
        };

        let (status_code, title) = self.fetch_metadata(url).await;

        Ok(Some(ScreenshotResult {
            url: url.to_owned(),
            screenshot: base64::engine::general_purpose::STANDARD.encode(bytes),
            title,
            status_code,
        }))
    }
}

#[async_trait]
impl ToolAdapter for ScreenshotAdapter {
    fn name(&self) -> &'static str {
        "screenshot"
    }

    fn binary(&self) -> Option<&str> {
        Some(&self.chromium)
    }

    async fn scan(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()> {
        let config: ScreenshotConfig = decode_config(&scan.configuration)?;

        let urls: Vec<String> = if config.urls.is_empty() {
            vec![ensure_scheme(&scan.target)]
        } else {
            config.urls.iter().map(|u| ensure_scheme(u)).collect()
        };

        ctx.log(
            LogLevel::Info,
            format!("capturing {} URL(s) at {}", urls.len(), config.resolution),
        )
        .await;

        let mut captured = 0usize;
        let total = urls.len().max(1);

        for (index, url) in urls.iter().enumerate() {
            ctx.checkpoint()?;
            if let Some(record) = self.capture(ctx, url, &config).await? {
                ctx.append(&record).await?;
                captured += 1;
                ctx.log(
                    LogLevel::Success,
                    format!(
                        "captured {url}{}",
                        record
                            .title
                            .as_deref()
                            .map(|t| format!(" ({t})"))
                            .unwrap_or_default()
                    ),
                )
                .await;
            }
            ctx.progress((100 * (index + 1) / total) as u8).await;
        }

        if captured == 0 {
            return Err(ScanError::Tool("no URL could be captured".into()));
        }

        ctx.log(
            LogLevel::Info,
            format!("screenshot run finished: {captured}/{} captured", urls.len()),
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_parsing() {
        assert_eq!(parse_resolution("1920x1080"), (1920, 1080));
        assert_eq!(parse_resolution("800 x 600"), (800, 600));
        assert_eq!(parse_resolution("garbage"), (1440, 900));
        assert_eq!(parse_resolution("0x100"), (1440, 900));
    }

    #[test]
    fn title_extraction() {
        assert_eq!(
            extract_title("<html><head><TITLE>Login Portal</TITLE></head></html>"),
            Some("Login Portal".into())
        );
        assert_eq!(
            extract_title("<title lang=\"en\">\n  Spaced  \n</title>"),
            Some("Spaced".into())
        );
        assert_eq!(extract_title("<title></title>"), None);
        assert_eq!(extract_title("<h1>no title</h1>"), None);
    }

    #[test]
    fn scheme_defaulting() {
        assert_eq!(ensure_scheme("example.com"), "https://example.com");
        assert_eq!(ensure_scheme("http://example.com"), "http://example.com");
        assert_eq!(
            ensure_scheme("  https://example.com/x  "),
            "https://example.com/x"
        );
    }

    #[test]
    fn config_defaults() {
        let config: ScreenshotConfig = decode_config(&serde_json::json!({})).unwrap();
        assert!(config.urls.is_empty());
        assert_eq!(config.per_url_timeout, 30);
        assert_eq!(config.resolution, "1440x900");
        assert!(!config.full_page);
    }
}
