//! Fingerprint classification.
//!
//! Plugin names reported by fingerprinting tools are classified into
//! technology categories via a lowercase-substring table, checked in
//! order. Names matching a known CMS additionally yield a canonical CMS
//! name for the identification record.

use argus_domain::results::TechCategory;

/// Substring → category table. First containment match wins, so the
/// more specific security headers sit above the generic entries.
const CATEGORY_TABLE: &[(&str, TechCategory)] = &[
    // CMS
    ("wordpress", TechCategory::Cms),
    ("joomla", TechCategory::Cms),
    ("drupal", TechCategory::Cms),
    ("magento", TechCategory::Cms),
    ("typo3", TechCategory::Cms),
    ("prestashop", TechCategory::Cms),
    ("opencart", TechCategory::Cms),
    ("umbraco", TechCategory::Cms),
    ("moodle", TechCategory::Cms),
    ("ghost", TechCategory::Cms),
    // Security headers & products
    ("x-frame-options", TechCategory::Security),
    ("strict-transport-security", TechCategory::Security),
    ("content-security-policy", TechCategory::Security),
    ("x-xss-protection", TechCategory::Security),
    ("x-content-type-options", TechCategory::Security),
    ("httponly", TechCategory::Security),
    ("waf", TechCategory::Security),
    ("incapsula", TechCategory::Security),
    ("sucuri", TechCategory::Security),
    ("recaptcha", TechCategory::Security),
    // Servers
    ("nginx", TechCategory::Server),
    ("apache", TechCategory::Server),
    ("litespeed", TechCategory::Server),
    ("openresty", TechCategory::Server),
    ("lighttpd", TechCategory::Server),
    ("tomcat", TechCategory::Server),
    ("caddy", TechCategory::Server),
    ("iis", TechCategory::Server),
    // Frameworks & libraries
    ("jquery", TechCategory::Framework),
    ("react", TechCategory::Framework),
    ("angular", TechCategory::Framework),
    ("vue", TechCategory::Framework),
    ("bootstrap", TechCategory::Framework),
    ("laravel", TechCategory::Framework),
    ("django", TechCategory::Framework),
    ("rails", TechCategory::Framework),
    ("symfony", TechCategory::Framework),
    ("express", TechCategory::Framework),
    ("next.js", TechCategory::Framework),
    ("modernizr", TechCategory::Framework),
    // Languages & runtimes
    ("php", TechCategory::Language),
    ("python", TechCategory::Language),
    ("ruby", TechCategory::Language),
    ("perl", TechCategory::Language),
    ("asp.net", TechCategory::Language),
    ("node.js", TechCategory::Language),
    ("java", TechCategory::Language),
    // Informational probes
    ("title", TechCategory::Info),
    ("email", TechCategory::Info),
    ("country", TechCategory::Info),
    ("ip", TechCategory::Info),
    ("cookies", TechCategory::Info),
    ("uncommonheaders", TechCategory::Info),
    ("html5", TechCategory::Info),
    ("meta-generator", TechCategory::Info),
    ("redirect", TechCategory::Info),
    ("via-proxy", TechCategory::Info),
];

/// Canonical names for the CMS identification record.
const KNOWN_CMS: &[(&str, &str)] = &[
    ("wordpress", "WordPress"),
    ("joomla", "Joomla"),
    ("drupal", "Drupal"),
    ("magento", "Magento"),
    ("typo3", "TYPO3"),
    ("prestashop", "PrestaShop"),
    ("opencart", "OpenCart"),
    ("umbraco", "Umbraco"),
    ("moodle", "Moodle"),
    ("ghost", "Ghost"),
];

/// Classify a plugin name into its technology category.
pub fn classify(name: &str) -> TechCategory {
    let lower = name.to_lowercase();
    for (needle, category) in CATEGORY_TABLE {
        if lower.contains(needle) {
            return *category;
        }
    }
    TechCategory::Other
}

/// The canonical CMS name when the plugin identifies one.
pub fn identify_cms(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    KNOWN_CMS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, canonical)| *canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_scenario_is_deterministic() {
        // The canonical fingerprint stream and its expected categories.
        let expectations = [
            ("WordPress", TechCategory::Cms),
            ("nginx", TechCategory::Server),
            ("jQuery", TechCategory::Framework),
            ("X-Frame-Options", TechCategory::Security),
            ("title", TechCategory::Info),
        ];
        for (name, expected) in expectations {
            assert_eq!(classify(name), expected, "misclassified {name}");
        }
    }

    #[test]
    fn unknown_names_fall_through_to_other() {
        assert_eq!(classify("MegaObscureWidget"), TechCategory::Other);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify("WORDPRESS"), TechCategory::Cms);
        assert_eq!(classify("NGINX"), TechCategory::Server);
    }

    #[test]
    fn cms_identification_is_canonical() {
        assert_eq!(identify_cms("WordPress"), Some("WordPress"));
        assert_eq!(identify_cms("wordpress-super-cache"), Some("WordPress"));
        assert_eq!(identify_cms("Drupal"), Some("Drupal"));
        assert_eq!(identify_cms("nginx"), None);
        assert_eq!(identify_cms("jQuery"), None);
    }

    #[test]
    fn security_headers_beat_generic_entries() {
        // "X-Frame-Options" must not land in Other or Info.
        assert_eq!(classify("X-Frame-Options"), TechCategory::Security);
        assert_eq!(classify("Strict-Transport-Security"), TechCategory::Security);
    }
}
