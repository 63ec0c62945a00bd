//! Exercises the ACL engine and attribute engine together: a server reads
//! a resource it has no explicit ACL entry for (denied), gains access via
//! the default ACL row, then crosses a notification threshold.

use std::time::Duration;

use lwm2m_core::{
    acl::Permission,
    attribute::{AttributeSet, AttributeState, NotifyDecision},
    registry::Registry,
};

#[test]
fn default_acl_row_grants_access_after_explicit_denial() {
    let mut registry = Registry::new();

    let denied = registry.acl_for(3, 0).check(200, Permission::READ, "read", "/3/0");
    assert!(matches!(denied, Err(lwm2m_core::CoreError::Unauthorized { .. })));

    registry.acl_for(3, 0).set_entry(lwm2m_core::acl::DEFAULT_SHORT_SERVER_ID, Permission::READ);
    registry.acl_for(3, 0).check(200, Permission::READ, "read", "/3/0").unwrap();
}

#[test]
fn attribute_engine_notifies_once_pmin_elapses_past_threshold() {
    let attrs = AttributeSet { pmin: Some(10), gt: Some(20.0), ..Default::default() };
    let mut state = AttributeState::new(attrs);

    assert_eq!(state.evaluate(Duration::from_secs(5), Some(25.0)), NotifyDecision::Skip);
    assert_eq!(
        state.evaluate(Duration::from_secs(10), Some(25.0)),
        NotifyDecision::NotifyThresholdCrossed
    );
}
