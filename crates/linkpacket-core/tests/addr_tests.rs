//! Integration tests for hardware addresses

use linkpacket_core::{Addr, MAX_ADDR_LEN};
use proptest::prelude::*;

#[test]
fn test_infiniband_length() {
    let bytes = [0x80u8; 20];
    let addr = Addr::new(&bytes).unwrap();
    assert_eq!(addr.len(), 20);
    assert_eq!(addr.to_string().split(':').count(), 20);
}

#[test]
fn test_serde_as_string() {
    let addr: Addr = "02:00:5e:10:00:01".parse().unwrap();
    let json = serde_json::to_string(&addr).unwrap();
    assert_eq!(json, "\"02:00:5e:10:00:01\"");
    let back: Addr = serde_json::from_str(&json).unwrap();
    assert_eq!(back, addr);
}

proptest! {
    #[test]
    fn prop_display_parses_back(bytes in proptest::collection::vec(any::<u8>(), 1..=MAX_ADDR_LEN)) {
        let addr = Addr::new(&bytes).unwrap();
        let parsed: Addr = addr.to_string().parse().unwrap();
        prop_assert_eq!(parsed.as_bytes(), &bytes[..]);
    }

    #[test]
    fn prop_oversized_rejected(extra in 1usize..64) {
        let bytes = vec![0u8; MAX_ADDR_LEN + extra];
        prop_assert!(Addr::new(&bytes).is_err());
        prop_assert!(Addr::from_valid_prefix(&bytes, MAX_ADDR_LEN + extra).is_err());
    }
}
