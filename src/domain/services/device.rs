use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

pub const DEVICE_ID_HEADER: &str = "x-device-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFingerprint {
    pub hash: String,
    pub label: String,
}

impl DeviceFingerprint {
    pub fn from_parts(user_agent: &str, accept_language: &str, device_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(user_agent.trim().as_bytes());
        hasher.update(b"\n");
        hasher.update(primary_language(accept_language).as_bytes());
        hasher.update(b"\n");
        hasher.update(device_id.trim().as_bytes());

        Self {
            hash: hex::encode(hasher.finalize()),
            label: describe_user_agent(user_agent),
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
        };
        Self::from_parts(
            get("user-agent"),
            get("accept-language"),
            get(DEVICE_ID_HEADER),
        )
    }
}

/// `th-TH,th;q=0.9,en;q=0.8` -> `th-th`
fn primary_language(accept_language: &str) -> String {
    accept_language
        .split(',')
        .next()
        .and_then(|s| s.split(';').next())
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Short human label such as `Chrome on Windows`.
pub fn describe_user_agent(user_agent: &str) -> String {
    let ua = user_agent.to_lowercase();
    if ua.trim().is_empty() {
        return "Unknown device".to_string();
    }

    let browser = if ua.contains("edg/") {
        "Edge"
    } else if ua.contains("opr/") || ua.contains("opera") {
        "Opera"
    } else if ua.contains("firefox/") {
        "Firefox"
    } else if ua.contains("chrome/") || ua.contains("crios/") {
        "Chrome"
    } else if ua.contains("safari/") {
        "Safari"
    } else if ua.contains("okhttp") || ua.contains("dart") {
        "App"
    } else {
        "Browser"
    };

    let os = if ua.contains("iphone") || ua.contains("ipad") {
        "iOS"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("windows") {
        "Windows"
    } else if ua.contains("mac os") || ua.contains("macintosh") {
        "macOS"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        "unknown OS"
    };

    format!("{} on {}", browser, os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";
    const SAFARI_IOS: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";

    #[test]
    fn test_fingerprint_is_stable() {
        let a = DeviceFingerprint::from_parts(CHROME_WIN, "th-TH,th;q=0.9", "dev-1");
        let b = DeviceFingerprint::from_parts(CHROME_WIN, "th-TH,en;q=0.5", "dev-1");
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn test_fingerprint_differs_per_device() {
        let a = DeviceFingerprint::from_parts(CHROME_WIN, "th-TH", "dev-1");
        let b = DeviceFingerprint::from_parts(CHROME_WIN, "th-TH", "dev-2");
        let c = DeviceFingerprint::from_parts(SAFARI_IOS, "th-TH", "dev-1");
        assert_ne!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_labels() {
        assert_eq!(describe_user_agent(CHROME_WIN), "Chrome on Windows");
        assert_eq!(describe_user_agent(SAFARI_IOS), "Safari on iOS");
        assert_eq!(describe_user_agent(""), "Unknown device");
    }

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static(CHROME_WIN));
        headers.insert("accept-language", HeaderValue::from_static("th-TH"));
        headers.insert(DEVICE_ID_HEADER, HeaderValue::from_static("dev-1"));

        let from_headers = DeviceFingerprint::from_headers(&headers);
        let from_parts = DeviceFingerprint::from_parts(CHROME_WIN, "th-TH", "dev-1");
        assert_eq!(from_headers, from_parts);
    }
}
