//! Tests for the token cache.

use super::*;
use crate::credentials::SharedKey;
use crate::signer::FixedClock;
use std::sync::Arc;

fn cache_at(now: i64) -> TokenCache {
    let signer = SasSigner::new(SharedKey::from_base64("c2VjcmV0").unwrap())
        .with_clock(Arc::new(FixedClock(now)));
    TokenCache::new(signer, "h.azure-devices.net/devices/d")
}

#[test]
fn test_new_cache_has_no_token() {
    let cache = cache_at(1000);

    assert!(cache.current().is_none());
    assert!(matches!(
        cache.require_current(),
        Err(DeviceClientError::TokenNotIssued)
    ));
}

#[test]
fn test_issue_makes_token_current() {
    let cache = cache_at(1000);

    let issued = cache.issue(600);

    assert_eq!(cache.current(), Some(issued.clone()));
    assert_eq!(cache.require_current().unwrap(), issued);
    assert_eq!(issued.expiry(), 1600);
}

#[test]
fn test_reissue_replaces_current_token() {
    let cache = cache_at(1000);

    let first = cache.issue(600);
    let second = cache.issue(60);

    assert_ne!(first, second);
    assert_eq!(cache.current(), Some(second));
}

/// An expired token stays current; nothing renews it behind the caller.
#[test]
fn test_expired_token_is_not_renewed() {
    let cache = cache_at(1000);
    let issued = cache.issue(0);

    assert!(issued.is_expired_at(1000));
    assert_eq!(cache.current(), Some(issued));
}

#[test]
fn test_concurrent_readers_see_complete_tokens() {
    let cache = Arc::new(cache_at(1000));
    let expected = cache.issue(600);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || cache.current())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Some(expected.clone()));
    }
}
