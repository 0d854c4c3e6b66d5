//! Plaintext metrics scraping

use nodekeeper_core::{NodeError, Result};
use tracing::instrument;

/// Fetch `url` and read the value of the sample named exactly `name`
#[instrument(skip(http))]
pub async fn scrape_sample(http: &reqwest::Client, url: &str, name: &str) -> Result<u32> {
    let body = http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    parse_sample(&body, name)
}

/// Find `<name> <value>` in exposition text and parse the value as a count
///
/// The name must match including labels; `libp2p_peers` does not match
/// `libp2p_peers_total`. Gauges are often exported as floats (`12.0`),
/// which are truncated.
pub fn parse_sample(body: &str, name: &str) -> Result<u32> {
    let line = body
        .lines()
        .find(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with(' '))
        })
        .ok_or_else(|| NodeError::Metrics(format!("sample {} not found", name)))?;

    let mut parts = line[name.len()..].split_whitespace();
    let value = parts
        .next()
        .ok_or_else(|| NodeError::Metrics(format!("sample {} has no value", name)))?;

    let parsed: f64 = value
        .parse()
        .map_err(|_| NodeError::Metrics(format!("sample {} has bad value '{}'", name, value)))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(NodeError::Metrics(format!(
            "sample {} out of range: {}",
            name, value
        )));
    }
    Ok(parsed as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"# HELP libp2p_peers Count of libp2p peers currently connected
# TYPE libp2p_peers gauge
libp2p_peers_total 99
libp2p_peers 57
p2p_peer_count{state="Connected"} 64
p2p_peer_count{state="Disconnected"} 3
net_peerCount 21.0
bad_sample NaN
"#;

    #[test]
    fn test_exact_name_match() {
        assert_eq!(parse_sample(BODY, "libp2p_peers").unwrap(), 57);
        assert_eq!(
            parse_sample(BODY, "p2p_peer_count{state=\"Connected\"}").unwrap(),
            64
        );
    }

    #[test]
    fn test_float_value() {
        assert_eq!(parse_sample(BODY, "net_peerCount").unwrap(), 21);
    }

    #[test]
    fn test_missing_or_bad() {
        assert!(parse_sample(BODY, "missing").is_err());
        assert!(parse_sample(BODY, "bad_sample").is_err());
        assert!(parse_sample("", "libp2p_peers").is_err());
        assert!(parse_sample("libp2p_peers \n", "libp2p_peers").is_err());
    }
}
