use std::collections::HashSet;

use serde::Serialize;

/// Display bucket for concepts stored without a category.
pub const UNCATEGORIZED: &str = "Uncategorized";

// Category -> keywords. Order matters: a keyword listed under two categories
// is reported under the first one.
const CONCEPT_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Threat Intelligence",
        &[
            "IOC",
            "indicator of compromise",
            "threat feed",
            "STIX",
            "TAXII",
            "threat actor",
            "APT",
            "advanced persistent threat",
            "TTP",
            "tactics techniques procedures",
            "campaign",
            "threat hunting",
        ],
    ),
    (
        "Cryptography",
        &[
            "hash",
            "hashing",
            "MD5",
            "SHA",
            "SHA-256",
            "SHA-1",
            "encryption",
            "decryption",
            "AES",
            "RSA",
            "symmetric",
            "asymmetric",
            "public key",
            "private key",
            "certificate",
            "TLS",
            "SSL",
            "PKI",
            "digital signature",
            "cipher",
            "plaintext",
            "ciphertext",
        ],
    ),
    (
        "Network Security",
        &[
            "firewall",
            "IDS",
            "IPS",
            "intrusion detection",
            "intrusion prevention",
            "VPN",
            "proxy",
            "DMZ",
            "network segmentation",
            "VLAN",
            "packet",
            "protocol",
            "TCP",
            "UDP",
            "IP address",
            "port",
            "DNS",
            "DHCP",
            "NAT",
            "router",
            "switch",
        ],
    ),
    (
        "Malware",
        &[
            "malware",
            "virus",
            "worm",
            "trojan",
            "ransomware",
            "spyware",
            "adware",
            "rootkit",
            "botnet",
            "backdoor",
            "keylogger",
            "payload",
            "exploit",
            "zero-day",
            "0day",
        ],
    ),
    (
        "Authentication",
        &[
            "authentication",
            "authorization",
            "MFA",
            "2FA",
            "multi-factor",
            "password",
            "credential",
            "SSO",
            "single sign-on",
            "OAuth",
            "SAML",
            "token",
            "session",
            "identity",
            "IAM",
            "RBAC",
        ],
    ),
    (
        "Frameworks & Standards",
        &[
            "NIST",
            "MITRE ATT&CK",
            "ATT&CK",
            "ISO 27001",
            "CIS Controls",
            "SOC 2",
            "PCI DSS",
            "HIPAA",
            "GDPR",
            "compliance",
            "framework",
            "standard",
            "policy",
            "procedure",
            "control",
        ],
    ),
    (
        "Incident Response",
        &[
            "incident response",
            "IR",
            "forensics",
            "DFIR",
            "triage",
            "containment",
            "eradication",
            "recovery",
            "lessons learned",
            "playbook",
            "SIEM",
            "SOC",
            "security operations",
            "alert",
        ],
    ),
    (
        "Vulnerabilities",
        &[
            "vulnerability",
            "CVE",
            "patch",
            "exploit",
            "buffer overflow",
            "SQL injection",
            "XSS",
            "cross-site scripting",
            "CSRF",
            "RCE",
            "remote code execution",
            "privilege escalation",
            "OWASP",
            "penetration testing",
            "pentest",
            "bug bounty",
        ],
    ),
    (
        "Cloud Security",
        &[
            "cloud security",
            "AWS",
            "Azure",
            "GCP",
            "S3 bucket",
            "IAM policy",
            "security group",
            "container",
            "Docker",
            "Kubernetes",
            "serverless",
            "shared responsibility",
            "cloud native",
        ],
    ),
    (
        "Social Engineering",
        &[
            "phishing",
            "spear phishing",
            "vishing",
            "smishing",
            "pretexting",
            "social engineering",
            "baiting",
            "tailgating",
            "impersonation",
            "business email compromise",
            "BEC",
        ],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractedConcept {
    pub name: &'static str,
    pub category: &'static str,
}

pub fn category_names() -> impl Iterator<Item = &'static str> {
    CONCEPT_KEYWORDS.iter().map(|(category, _)| *category)
}

/// Scan text for known keyword phrases.
///
/// Matching is a plain case-insensitive substring test with no word-boundary
/// check, so "port" also fires inside "important". Results keep table order
/// and are de-duplicated on the lower-cased keyword.
pub fn extract_concepts(text: &str) -> Vec<ExtractedConcept> {
    let text_lower = text.to_lowercase();
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for &(category, keywords) in CONCEPT_KEYWORDS {
        for &keyword in keywords {
            let key = keyword.to_lowercase();
            if text_lower.contains(&key) && seen.insert(key) {
                found.push(ExtractedConcept { name: keyword, category });
            }
        }
    }

    tracing::debug!(hits = found.len(), "extracted concepts");
    found
}
