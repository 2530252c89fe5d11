// Subdomain extraction from the inbound Host header

/// Hosts that always mean "main site", whatever the root domain is
const LOOPBACK_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Pull the tenant subdomain out of `host`, relative to `root_domain`.
///
/// Returns `None` for the main domain, loopback hosts, and any host shape
/// not covered below:
/// - `<labels>.<root_domain>` yields `<labels>` (may itself contain dots)
/// - `<label>.localhost` yields `<label>`
pub fn extract_subdomain(host: &str, root_domain: &str) -> Option<String> {
    let host = strip_port(host.trim()).to_ascii_lowercase();
    let root = strip_port(root_domain.trim()).to_ascii_lowercase();

    if host.is_empty() || host == root || LOOPBACK_HOSTS.contains(&host.as_str()) {
        return None;
    }

    if !root.is_empty() {
        if let Some(prefix) = host.strip_suffix(root.as_str()).and_then(|p| p.strip_suffix('.')) {
            return valid_labels(prefix).then(|| prefix.to_string());
        }
    }

    // Local development: acme.localhost
    let labels: Vec<&str> = host.split('.').collect();
    if let [label, "localhost"] = labels.as_slice() {
        return valid_labels(label).then(|| label.to_string());
    }

    None
}

fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}

fn valid_labels(labels: &str) -> bool {
    !labels.is_empty()
        && labels.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Normalize an explicit subdomain supplied by a client header.
pub fn normalize_override(value: &str) -> Option<String> {
    let value = value.trim().to_ascii_lowercase();
    valid_labels(&value).then_some(value)
}
