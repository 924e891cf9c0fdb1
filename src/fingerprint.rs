//! # Change Fingerprinter
//!
//! Content digests embedded as pod template annotations, so that a change to a
//! referenced ConfigMap or Secret rolls the node workloads.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest of the exact text
pub fn digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Annotation key carrying a manifest's digest, `checksum/<component>-<part>`
pub fn annotation_key(component: &str, part: &str) -> String {
    format!("checksum/{component}-{part}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_known_value() {
        assert_eq!(
            digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_is_sensitive_to_whitespace() {
        assert_ne!(digest("data: a\n"), digest("data: a"));
        assert_eq!(digest("data: a\n").len(), 64);
    }

    #[test]
    fn test_annotation_key() {
        assert_eq!(
            annotation_key("rsyslog-relp-configurator", "auditd-config"),
            "checksum/rsyslog-relp-configurator-auditd-config"
        );
    }
}
