//! Unit tests for broker configuration defaults and validation.

use std::time::Duration;

use toolbus::config::{BrokerConfig, DEFAULT_QUEUE_DEPTH, DEFAULT_WORKERS};
use toolbus::AppError;

/// Defaults match the documented tunables.
#[test]
fn defaults() {
    let config = BrokerConfig::default();
    assert_eq!(config.workers, DEFAULT_WORKERS);
    assert_eq!(config.queue_depth, DEFAULT_QUEUE_DEPTH);
    assert!(config.tag.is_empty());
    assert!(config.heartbeat.is_none());
    assert!(config.decorate);
    assert!(!config.wait);
    assert!(!config.single_shot);
    assert!(config.validate().is_ok());
}

/// A zero worker count is rejected.
#[test]
fn zero_workers_fail_validation() {
    let config = BrokerConfig {
        workers: 0,
        ..BrokerConfig::default()
    };
    assert!(matches!(config.validate(), Err(AppError::Config(_))));
}

/// A zero queue depth is rejected.
#[test]
fn zero_queue_depth_fails_validation() {
    let config = BrokerConfig {
        queue_depth: 0,
        ..BrokerConfig::default()
    };
    assert!(matches!(config.validate(), Err(AppError::Config(_))));
}

/// Custom tunables pass validation.
#[test]
fn custom_tunables_validate() {
    let config = BrokerConfig {
        workers: 4,
        queue_depth: 64,
        tag: "broker-a".to_owned(),
        heartbeat: Some(Duration::from_secs(5)),
        ..BrokerConfig::default()
    };
    assert!(config.validate().is_ok());
}
