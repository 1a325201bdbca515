use url::Url;

/// `ChannelToken` is the short-lived bearer MGS issues for opening one
/// WebSocket connection. It is fetched fresh on every reconnect and is
/// never written to disk.
#[derive(Debug, Clone)]
pub struct ChannelToken(String);

impl ChannelToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// DNS suffix used to build the `ssmmessages` REST host for a region.
/// China regions (`cn-*`) live under a distinct TLD; everything else
/// defaults to the commercial suffix.
fn dns_suffix(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "amazonaws.com.cn"
    } else {
        "amazonaws.com"
    }
}

/// Resolves the `CreateControlChannel` REST endpoint for a region, honoring
/// an explicit override when the caller supplies one (e.g. for VPC
/// endpoints or test doubles).
pub fn resolve_rest_endpoint(region: &str, override_endpoint: Option<&str>) -> anyhow::Result<Url> {
    if let Some(endpoint) = override_endpoint {
        return Ok(Url::parse(endpoint)?);
    }
    let host = format!("ssmmessages.{}.{}", region, dns_suffix(region));
    Ok(Url::parse(&format!("https://{}", host))?)
}

/// Resolves the `wss://` control-channel URL for a given REST host and
/// short instance id.
pub fn control_channel_ws_url(mgs_host: &str, short_instance_id: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(&format!("wss://{}/v1/control-channel/{}", mgs_host, short_instance_id))?;
    url.query_pairs_mut()
        .append_pair("stream", "input")
        .append_pair("role", "publish_subscribe");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_token_round_trips_its_value() {
        let token = ChannelToken::new("opaque-bearer");
        assert_eq!(token.as_str(), "opaque-bearer");
        assert_eq!(token.into_string(), "opaque-bearer".to_string());
    }

    #[test]
    fn commercial_region_uses_amazonaws_com() {
        let url = resolve_rest_endpoint("us-east-1", None).unwrap();
        assert_eq!(url.host_str(), Some("ssmmessages.us-east-1.amazonaws.com"));
    }

    #[test]
    fn china_region_uses_cn_suffix() {
        let url = resolve_rest_endpoint("cn-north-1", None).unwrap();
        assert_eq!(url.host_str(), Some("ssmmessages.cn-north-1.amazonaws.com.cn"));
    }

    #[test]
    fn unknown_region_falls_back_to_default_pattern() {
        let url = resolve_rest_endpoint("mars-west-9", None).unwrap();
        assert_eq!(url.host_str(), Some("ssmmessages.mars-west-9.amazonaws.com"));
    }

    #[test]
    fn explicit_override_wins() {
        let url = resolve_rest_endpoint("us-east-1", Some("https://mgs.example.internal")).unwrap();
        assert_eq!(url.host_str(), Some("mgs.example.internal"));
    }

    #[test]
    fn ws_url_carries_stream_and_role_params() {
        let url = control_channel_ws_url("ssmmessages.us-east-1.amazonaws.com", "mi-abc").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/v1/control-channel/mi-abc");
        let pairs: Vec<_> = url.query_pairs().collect();
        assert!(pairs.iter().any(|(k, v)| k == "stream" && v == "input"));
        assert!(pairs.iter().any(|(k, v)| k == "role" && v == "publish_subscribe"));
    }
}
