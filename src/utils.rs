// Utility helpers shared by config, providers and services.

// Internal helper that supports `env_non_empty` operations.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Internal helper that supports `parse_rpc_url_list` operations.
pub fn parse_rpc_url_list(raw: &str) -> Vec<String> {
    raw.split([',', ';', '\n', '\r', ' '])
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Shortens an address for logs: first 6 and last 4 characters.
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Matches user agents that cannot host an in-page wallet extension.
pub fn is_mobile_user_agent(user_agent: &str) -> bool {
    let lower = user_agent.to_ascii_lowercase();
    ["android", "iphone", "ipad", "ipod", "mobile"]
        .iter()
        .any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rpc_url_list_splits_separators() {
        // Memastikan daftar RPC dipisah dengan koma, titik koma, dan spasi
        let urls = parse_rpc_url_list("https://a, https://b;https://c  https://d");
        assert_eq!(urls, vec!["https://a", "https://b", "https://c", "https://d"]);
    }

    #[test]
    fn short_address_keeps_head_and_tail() {
        // Memastikan alamat dipendekkan 6 karakter awal dan 4 akhir
        assert_eq!(
            short_address("0x742d35Cc6634C0532925a3b844Bc454e4438f44e"),
            "0x742d...f44e"
        );
        assert_eq!(short_address("short"), "short");
    }

    #[test]
    fn mobile_user_agent_detection() {
        // Memastikan user agent mobile terdeteksi
        assert!(is_mobile_user_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)"
        ));
        assert!(is_mobile_user_agent("Mozilla/5.0 (Linux; Android 14)"));
        assert!(!is_mobile_user_agent(
            "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/128.0"
        ));
    }
}
