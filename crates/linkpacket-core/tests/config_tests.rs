//! Integration tests for configuration loading

use linkpacket_core::filter::RawInstruction;
use linkpacket_core::{Config, Direction, Error};
use std::io::Write;

const ARP_ONLY: &str = r#"
direction = "in"

[[filter]]
op = 0x28
k = 12

[[filter]]
op = 0x15
jf = 1
k = 0x0806

[[filter]]
op = 0x06
k = 0xffff

[[filter]]
op = 0x06
"#;

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(ARP_ONLY.as_bytes()).unwrap();

    let config = Config::load(&path).expect("config loads");
    assert_eq!(config.direction, Direction::In);
    assert_eq!(config.filter.len(), 4);
    assert_eq!(config.filter[1], RawInstruction::new(0x15, 0, 1, 0x0806));
    assert_eq!(config.filter[3], RawInstruction::new(0x06, 0, 0, 0));
}

#[test]
fn test_empty_file_uses_defaults() {
    let config = Config::from_toml("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.direction, Direction::InOut);
}

#[test]
fn test_invalid_filter_rejected() {
    let toml = r#"
[[filter]]
op = 0x15
jt = 5
k = 1
"#;
    let err = Config::from_toml(toml).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }));
}

#[test]
fn test_unknown_direction_rejected() {
    assert!(Config::from_toml(r#"direction = "sideways""#).is_err());
}

#[test]
fn test_toml_roundtrip() {
    let original = Config::from_toml(ARP_ONLY).unwrap();
    let text = original.to_toml().expect("serializes");
    let parsed = Config::from_toml(&text).expect("parses");
    assert_eq!(original, parsed);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(dir.path().join("absent.toml")).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}
