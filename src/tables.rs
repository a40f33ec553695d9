//! Built-in lookup data. Strategies never read these directly; they are
//! the defaults `config` injects when nothing else is supplied.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What a service announces on connect.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BannerRecord {
    pub service: String,
    pub banner: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl BannerRecord {
    fn new(service: &str, banner: &str, version: &str) -> Self {
        Self {
            service: service.to_string(),
            banner: banner.to_string(),
            version: Some(version.to_string()),
        }
    }

    /// Record reported for ports missing from the table.
    pub fn unknown(port: u16) -> Self {
        Self {
            service: "Unknown".to_string(),
            banner: format!("Service running on port {port}"),
            version: Some("Unknown version".to_string()),
        }
    }
}

/// Commonly exposed TCP ports scanned in "common" mode.
pub fn common_ports() -> Vec<u16> {
    const COMMON: &[u16] = &[
        21, 22, 23, 25, 53, 80, 110, 143, 443, 993, 995, 1080, 3389, 5432, 5900, 8080,
    ];
    COMMON.to_vec()
}

/// Ports scanned in "full" mode.
pub fn full_ports() -> Vec<u16> {
    (1..=100).collect()
}

/// Ports checked for banners when no list is given.
pub fn banner_ports() -> Vec<u16> {
    vec![21, 22, 25, 53, 80, 110, 143, 443, 993, 995]
}

pub fn port_services() -> BTreeMap<u16, String> {
    [
        (21, "FTP"),
        (22, "SSH"),
        (23, "Telnet"),
        (25, "SMTP"),
        (53, "DNS"),
        (80, "HTTP"),
        (110, "POP3"),
        (143, "IMAP"),
        (443, "HTTPS"),
        (993, "IMAPS"),
        (995, "POP3S"),
        (1080, "SOCKS"),
        (3389, "RDP"),
        (5432, "PostgreSQL"),
        (5900, "VNC"),
        (8080, "HTTP-Alt"),
    ]
    .into_iter()
    .map(|(p, s)| (p, s.to_string()))
    .collect()
}

pub fn service_banners() -> BTreeMap<u16, BannerRecord> {
    BTreeMap::from([
        (21, BannerRecord::new("FTP", "220 ProFTPD 1.3.5 Server ready", "ProFTPD 1.3.5")),
        (22, BannerRecord::new("SSH", "SSH-2.0-OpenSSH_7.4", "OpenSSH 7.4")),
        (25, BannerRecord::new("SMTP", "220 mail.example.com ESMTP Postfix", "Postfix")),
        (53, BannerRecord::new("DNS", "DNS response", "BIND 9.11")),
        (80, BannerRecord::new("HTTP", "HTTP/1.1 200 OK\nServer: Apache/2.4.41", "Apache 2.4.41")),
        (110, BannerRecord::new("POP3", "+OK Dovecot ready", "Dovecot")),
        (143, BannerRecord::new("IMAP", "* OK [CAPABILITY IMAP4rev1] Dovecot ready", "Dovecot")),
        (443, BannerRecord::new("HTTPS", "HTTP/1.1 200 OK\nServer: nginx/1.18.0", "nginx 1.18.0")),
        (993, BannerRecord::new("IMAPS", "* OK [CAPABILITY IMAP4rev1] Dovecot ready (SSL)", "Dovecot SSL")),
        (995, BannerRecord::new("POP3S", "+OK Dovecot ready (SSL)", "Dovecot SSL")),
    ])
}

/// Substrings that make a path more likely to exist.
pub fn common_path_markers() -> Vec<String> {
    ["admin", "login", "images", "css", "js", "api", "docs"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub fn default_wordlist() -> Vec<String> {
    [
        "admin", "login", "test", "backup", "config", "api", "upload", "images", "js", "css",
        "docs", "download", "phpmyadmin", "admin.php", "login.php", "config.php", "backup.zip",
        "robots.txt", "sitemap.xml",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub fn default_usernames() -> Vec<String> {
    ["admin", "user", "test", "root", "administrator"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub fn default_passwords() -> Vec<String> {
    ["admin", "password", "123456", "test", "root"]
        .into_iter()
        .map(String::from)
        .collect()
}
