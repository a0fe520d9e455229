//! Tool adapters — one module per external scanner.
//!
//! Every adapter follows the same shape: decode its config bag first
//! (unknown fields rejected), log the redacted invocation, stream the
//! tool's output through [`argus_engine::exec`], append typed records as
//! they parse, and key success on usable output rather than exit code.

pub mod api_discovery;
pub mod classify;
pub mod cloud;
pub mod dns;
pub mod ffuf;
pub mod masscan;
pub mod nmap;
pub mod nuclei;
pub mod screenshot;
pub mod subfinder;
pub mod testssl;
pub mod whatweb;
pub mod wordlists;
pub mod wpscan;

use argus_engine::{ScanError, ScanResult};
use serde::de::DeserializeOwned;

/// Decode a scan's config bag into an adapter's typed config.
///
/// An absent or null bag decodes from `{}` so every field default
/// applies; unknown fields for the scan type at hand are a fatal config
/// error (`deny_unknown_fields` on each config struct).
pub fn decode_config<C: DeserializeOwned>(config: &serde_json::Value) -> ScanResult<C> {
    let effective = if config.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        config.clone()
    };
    serde_json::from_value(effective).map_err(|e| ScanError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        #[serde(default = "default_rate")]
        rate: u32,
    }

    fn default_rate() -> u32 {
        10_000
    }

    #[test]
    fn null_config_uses_defaults() {
        let sample: Sample = decode_config(&serde_json::Value::Null).unwrap();
        assert_eq!(sample.rate, 10_000);
    }

    #[test]
    fn empty_object_uses_defaults() {
        let sample: Sample = decode_config(&serde_json::json!({})).unwrap();
        assert_eq!(sample.rate, 10_000);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = decode_config::<Sample>(&serde_json::json!({ "ports": "80" })).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }
}
