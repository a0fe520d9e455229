//! Secret redaction for command-invocation log lines.
//!
//! Tokens and keys reach tools as CLI flags or `key=value` pairs. The
//! invocation is logged for the audit trail, so the secret values are
//! replaced before the line touches the log table.

use std::sync::OnceLock;

use regex::Regex;

const MASK: &str = "***";

fn flag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `--api-token SECRET`, `--api-token=SECRET`, `-t SECRET` style flags.
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(--?(?:api[-_]?token|token|api[-_]?key|key|password|passwd|secret)[= ])(\S+)",
        )
        .unwrap()
    })
}

fn pair_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `TOKEN=SECRET`, `AWS_SECRET_ACCESS_KEY=SECRET` style assignments.
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b((?:[a-z0-9_]*?(?:token|secret|password|key))=)(\S+)").unwrap()
    })
}

/// Replace secret values in a command line with `***`.
pub fn redact_secrets(line: &str) -> String {
    let pass1 = flag_pattern().replace_all(line, format!("${{1}}{MASK}"));
    pair_pattern()
        .replace_all(&pass1, format!("${{1}}{MASK}"))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_api_token_flag() {
        let line = "wpscan --url https://example.com --api-token hunter2abc";
        let redacted = redact_secrets(line);
        assert!(!redacted.contains("hunter2abc"));
        assert!(redacted.contains("--api-token ***"));
    }

    #[test]
    fn redacts_equals_form() {
        let redacted = redact_secrets("tool --api-token=hunter2abc -v");
        assert!(!redacted.contains("hunter2abc"));
        assert!(redacted.ends_with("-v"));
    }

    #[test]
    fn redacts_env_style_pairs() {
        let redacted = redact_secrets("AWS_SECRET_ACCESS_KEY=abcd1234 prowler aws");
        assert!(!redacted.contains("abcd1234"));
        assert!(redacted.contains("AWS_SECRET_ACCESS_KEY=***"));
    }

    #[test]
    fn leaves_ordinary_flags_alone() {
        let line = "nmap -sV -p 1-1000 example.com";
        assert_eq!(redact_secrets(line), line);
    }

    #[test]
    fn redacts_password_flag() {
        let redacted = redact_secrets("tool --password s3cr3t target");
        assert!(!redacted.contains("s3cr3t"));
    }
}
