use std::io::Write;
use std::time::Duration;

use chorus_bridge::config::{ChannelConfig, Config};
use chorus_bridge::error::ChorusError;
use tempfile::NamedTempFile;

fn write_config(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

#[test]
fn loads_a_full_config_file() {
    let file = write_config(
        r#"{
            "identity": {"own_id": " me "},
            "channel": {
                "kind": "relay",
                "base_url": "https://relay.test",
                "conversation_id": "quiz-1"
            },
            "correlation": {"poll_interval_ms": 250, "timeout_ms": 3000},
            "resources": {
                "proxy_template": "https://proxy.test/{cid}",
                "gateway_templates": ["https://ipfs.io/ipfs/{cid}"],
                "attempt_timeout_ms": 1500
            }
        }"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.own_id().as_deref(), Some("me"));
    assert!(matches!(
        config.channel,
        Some(ChannelConfig::Relay { ref conversation_id, .. }) if conversation_id == "quiz-1"
    ));
    assert_eq!(config.correlation().poll_interval(), Duration::from_millis(250));
    assert_eq!(config.correlation().timeout(), Duration::from_secs(3));
    assert_eq!(
        config.resources().endpoint_templates(),
        vec!["https://proxy.test/{cid}", "https://ipfs.io/ipfs/{cid}"]
    );
    assert_eq!(config.resources().attempt_timeout(), Duration::from_millis(1500));
}

#[test]
fn relay_without_conversation_is_rejected() {
    let file = write_config(
        r#"{"channel": {"kind": "relay", "base_url": "https://relay.test", "conversation_id": " "}}"#,
    );
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ChorusError::Config(_)));
}

#[test]
fn malformed_json_is_a_config_error() {
    let file = write_config("{not json");
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ChorusError::Config(_)));
}

#[test]
fn gossip_section_parses() {
    let file = write_config(
        r#"{"channel": {
            "kind": "gossip",
            "listen": ["/ip4/127.0.0.1/tcp/0"],
            "peer_id": "quiz-agent",
            "peer_public_key": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
        }}"#,
    );
    let config = Config::from_file(file.path()).unwrap();
    assert!(matches!(config.channel, Some(ChannelConfig::Gossip { .. })));
}
