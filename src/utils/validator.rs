use url::Url;

/// 传输层能处理的协议
const SUPPORTED_SCHEMES: [&str; 2] = ["http", "https"];

pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => SUPPORTED_SCHEMES.contains(&parsed.scheme()) && parsed.host_str().is_some(),
        Err(_) => false,
    }
}
