// Topic layout shared with the device firmware

pub const DATA_ROOT: &str = "data";
pub const CONFIG_PUBLISH_ROOT: &str = "config/publish";
pub const CONFIG_SUBSCRIBE_ROOT: &str = "config/subscribe";
pub const RESPONSE_SUFFIX: &str = "response";

/// Live sensor readings
pub fn data_topic(device_id: &str) -> String {
    format!("{}/{}", DATA_ROOT, device_id)
}

/// Push a new configuration to a device
pub fn config_push_topic(device_id: &str) -> String {
    format!("{}/{}", CONFIG_PUBLISH_ROOT, device_id)
}

pub fn config_push_ack_topic(device_id: &str) -> String {
    response_topic(&config_push_topic(device_id))
}

/// Ask a device (or a master on behalf of its slave) for its configuration
pub fn config_fetch_topic(device_id: &str) -> String {
    format!("{}/{}", CONFIG_SUBSCRIBE_ROOT, device_id)
}

pub fn config_fetch_response_topic(device_id: &str) -> String {
    response_topic(&config_fetch_topic(device_id))
}

/// Replies always land on `<request>/response`.
pub fn response_topic(request_topic: &str) -> String {
    format!("{}/{}", request_topic, RESPONSE_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_match_firmware_layout() {
        assert_eq!(data_topic("dev-A"), "data/dev-A");
        assert_eq!(config_push_topic("dev-A"), "config/publish/dev-A");
        assert_eq!(config_push_ack_topic("dev-A"), "config/publish/dev-A/response");
        assert_eq!(config_fetch_topic("dev-A"), "config/subscribe/dev-A");
        assert_eq!(
            config_fetch_response_topic("dev-A"),
            "config/subscribe/dev-A/response"
        );
    }
}
