use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use url::Url;

/// Read the domain list: one domain per line (or the first field of a
/// CSV-ish row), normalized and deduplicated in input order.
pub fn read_domains(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read domain list {}", path.display()))?;

    let mut seen = HashSet::new();
    let mut domains = Vec::new();
    let mut skipped_header = false;

    for line in raw.lines() {
        let value = line.split(',').next().unwrap_or("").trim();
        if value.is_empty() || value.starts_with('#') {
            continue;
        }
        // Header row from a spreadsheet export
        if !skipped_header
            && (value.eq_ignore_ascii_case("domain") || value.eq_ignore_ascii_case("url"))
        {
            skipped_header = true;
            continue;
        }
        let domain = normalize_domain(value);
        if domain.is_empty() {
            continue;
        }
        if seen.insert(domain.clone()) {
            domains.push(domain);
        }
    }

    if domains.is_empty() {
        bail!("No domains found in {}", path.display());
    }
    Ok(domains)
}

/// Normalize to the pipeline's unique key: scheme stripped, host lowercased,
/// no trailing slash. A path is kept as-is when the input carries one.
pub fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    // Full URLs: let the parser pull out host + path
    if trimmed.contains("://") {
        if let Ok(url) = Url::parse(trimmed) {
            if let Some(host) = url.host_str() {
                let path = url.path().trim_end_matches('/');
                return format!("{}{}", host.to_ascii_lowercase(), path);
            }
        }
        return String::new();
    }

    // Bare hostname, possibly with a path
    let trimmed = trimmed.trim_end_matches('/');
    match trimmed.split_once('/') {
        Some((host, path)) => {
            let path = path.trim_end_matches('/');
            if path.is_empty() {
                host.to_ascii_lowercase()
            } else {
                format!("{}/{}", host.to_ascii_lowercase(), path)
            }
        }
        None => trimmed.to_ascii_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn normalize_strips_scheme_and_trailing_slash() {
        assert_eq!(normalize_domain("https://Example.COM/"), "example.com");
        assert_eq!(normalize_domain("http://example.com"), "example.com");
        assert_eq!(normalize_domain("Example.Com"), "example.com");
    }

    #[test]
    fn normalize_keeps_path() {
        assert_eq!(normalize_domain("https://example.com/blog/"), "example.com/blog");
        assert_eq!(normalize_domain("example.com/blog"), "example.com/blog");
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert_eq!(normalize_domain("   "), "");
        assert_eq!(normalize_domain("https://"), "");
    }

    #[test]
    fn read_domains_dedupes_and_skips_header() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("domains.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "domain").unwrap();
        writeln!(f, "example.com").unwrap();
        writeln!(f, "# comment").unwrap();
        writeln!(f, "https://example.com/").unwrap();
        writeln!(f, "other.org,extra,fields").unwrap();
        writeln!(f).unwrap();
        drop(f);

        let domains = read_domains(&path).unwrap();
        assert_eq!(domains, vec!["example.com", "other.org"]);
    }

    #[test]
    fn read_domains_fails_on_empty_list() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "# nothing here\n\n").unwrap();
        assert!(read_domains(&path).is_err());
    }
}
