use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::types::ProbeInput;

/// Parse a port list into a deduplicated list of TCP ports (1..=65535).
///
/// Supported formats, freely mixed:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// - separators: newlines and commas
/// - comments: everything after `#` on a line is ignored
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        for item in line.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some((a, b)) = item.split_once('-') {
                let start = parse_port_str(a.trim())
                    .with_context(|| format!("line {line_no}: invalid start in range: {a}"))?;
                let end = parse_port_str(b.trim())
                    .with_context(|| format!("line {line_no}: invalid end in range: {b}"))?;
                if start > end {
                    bail!("line {line_no}: invalid range {start}-{end} (start > end)");
                }
                out.extend(start..=end);
                continue;
            }

            let p = parse_port_str(item)
                .with_context(|| format!("line {line_no}: invalid port value: {item}"))?;
            out.push(p);
        }
    }

    dedup_ports(&out)
}

/// Keep the first occurrence of each port, in order. Port 0 is rejected.
pub fn dedup_ports(ports: &[u16]) -> Result<Vec<u16>> {
    let mut seen = HashSet::with_capacity(ports.len());
    let mut out = Vec::with_capacity(ports.len());
    for &p in ports {
        if p == 0 {
            bail!("port out of range: 0");
        }
        if seen.insert(p) {
            out.push(p);
        }
    }
    Ok(out)
}

/// Parse a wordlist: one entry per line, trimmed; blank lines and lines
/// starting with `#` are skipped. Order and duplicates are preserved.
pub fn parse_wordlist_str(s: &str) -> Vec<String> {
    non_blank(s.lines().filter(|l| !l.trim_start().starts_with('#')))
}

/// Trimmed entries with blanks dropped.
pub fn non_blank<S: AsRef<str>>(words: impl IntoIterator<Item = S>) -> Vec<String> {
    words
        .into_iter()
        .filter_map(|w| {
            let w = w.as_ref().trim();
            (!w.is_empty()).then(|| w.to_string())
        })
        .collect()
}

pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<Vec<u16>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    parse_ports_str(&content)
}

pub fn load_wordlist_from_path(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read wordlist: {}", path.as_ref().display()))?;
    Ok(parse_wordlist_str(&content))
}

pub fn port_inputs(ports: &[u16]) -> Vec<ProbeInput> {
    ports.iter().copied().map(ProbeInput::port).collect()
}

pub fn path_inputs(paths: &[String]) -> Vec<ProbeInput> {
    paths.iter().map(|p| ProbeInput::path(p.as_str())).collect()
}

/// Every username paired with every password, username-major.
pub fn credential_inputs(usernames: &[String], passwords: &[String]) -> Vec<ProbeInput> {
    usernames
        .iter()
        .flat_map(|u| passwords.iter().map(move |p| ProbeInput::credential(u.as_str(), p.as_str())))
        .collect()
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
