//! Unit-of-work access checking tests for rowgate.
//!
//! Tests the AccessManager and SecureEntity wrappers:
//! - Eager and lazy READ checks
//! - UPDATE checks on flush, with rollback of denied writes
//! - Disabled and delayed checks

use super::common::*;
use pretty_assertions::assert_eq;
use rowgate_core::{AccessType, SecurityContext, Value};
use rowgate_filter::{AccessManager, FilterError, ProxyStrategy};
use std::sync::Arc;

fn manager(ctx: &TestContext, context: impl SecurityContext + 'static) -> AccessManager {
    AccessManager::new(Arc::new(ctx.filter()), Arc::new(context))
}

// =============================================================================
// READ CHECKS
// =============================================================================

pub fn test_eager_wrapper_checks_on_creation(ctx: &TestContext) {
    println!("  🧪 test_eager_wrapper_checks_on_creation");

    let manager = manager(ctx, ctx.as_john());
    let alice = manager
        .secure(ctx.entity("Contact", 1), ProxyStrategy::Eager)
        .unwrap();
    assert_eq!(alice.get("name").unwrap(), Value::from("Alice"));

    let carol = manager.secure(ctx.entity("Contact", 3), ProxyStrategy::Eager);
    assert!(matches!(carol, Err(FilterError::AccessDenied { .. })));

    println!("     ✓ Mary's contact cannot be wrapped for John");
}

pub fn test_lazy_wrapper_checks_on_first_read(ctx: &TestContext) {
    println!("  🧪 test_lazy_wrapper_checks_on_first_read");

    let manager = manager(ctx, ctx.as_john());
    let carol = manager
        .secure(ctx.entity("Contact", 3), ProxyStrategy::Lazy)
        .unwrap();
    assert_eq!(carol.entity_name(), "Contact");
    assert!(matches!(
        carol.get("name"),
        Err(FilterError::AccessDenied {
            access_type: AccessType::Read,
            ..
        })
    ));
    assert!(carol.entity().is_err());

    println!("     ✓ Reads through the wrapper are denied");
}

// =============================================================================
// UPDATE CHECKS
// =============================================================================

pub fn test_flush_checks_new_state(ctx: &TestContext) {
    println!("  🧪 test_flush_checks_new_state");

    let manager = manager(ctx, ctx.as_john());
    let bob = ctx.entity("Contact", 2);
    let secure = manager.secure(bob.clone(), ProxyStrategy::Eager).unwrap();

    secure.set("name", "Robert");
    assert!(secure.is_dirty());
    assert_eq!(secure.get("name").unwrap(), Value::from("Robert"));
    assert_eq!(bob.get("name"), Some(Value::from("Bob")));

    secure.flush().unwrap();
    assert_eq!(bob.get("name"), Some(Value::from("Robert")));

    println!("     ✓ Permitted writes reach the entity");

    secure.set("owner", ctx.mary.clone());
    let error = secure.flush().unwrap_err();
    assert!(matches!(
        error,
        FilterError::AccessDenied {
            access_type: AccessType::Update,
            ..
        }
    ));
    assert_eq!(bob.get("owner"), Some(Value::Entity(ctx.john.clone())));

    // Restore the fixture for later modules.
    secure.set("name", "Bob");
    secure.flush().unwrap();

    println!("     ✓ Handing the contact to Mary is rolled back");
}

// =============================================================================
// DISABLED AND DELAYED CHECKS
// =============================================================================

pub fn test_disabled_checks(ctx: &TestContext) {
    println!("  🧪 test_disabled_checks");

    let manager = manager(ctx, ctx.as_mary());
    {
        let _disabled = manager.disable_checks();
        assert!(!manager.checks_enabled());
        let alice = manager
            .secure(ctx.entity("Contact", 1), ProxyStrategy::Eager)
            .unwrap();
        assert_eq!(alice.get("name").unwrap(), Value::from("Alice"));
    }
    assert!(manager.checks_enabled());
    assert!(manager
        .secure(ctx.entity("Contact", 1), ProxyStrategy::Eager)
        .is_err());

    println!("     ✓ Checks resume when the guard is dropped");
}

pub fn test_delayed_checks(ctx: &TestContext) {
    println!("  🧪 test_delayed_checks");

    let manager = manager(ctx, ctx.as_mary());
    let delayed = manager.delay_checks();
    let dave = manager
        .secure(ctx.entity("Contact", 4), ProxyStrategy::Eager)
        .unwrap();
    let alice = manager
        .secure(ctx.entity("Contact", 1), ProxyStrategy::Eager)
        .unwrap();
    assert_eq!(manager.pending_checks(), 2);
    assert_eq!(dave.get("name").unwrap(), Value::from("Dave"));

    let error = delayed.finish().unwrap_err();
    assert!(matches!(error, FilterError::AccessDenied { .. }));
    assert_eq!(manager.pending_checks(), 0);
    drop(alice);

    println!("     ✓ Pending checks run when the delay ends");

    let delayed = manager.delay_checks();
    manager
        .secure(ctx.entity("Contact", 1), ProxyStrategy::Eager)
        .unwrap();
    drop(delayed);
    assert_eq!(manager.pending_checks(), 0);

    println!("     ✓ Dropping the guard discards pending checks");
}

// =============================================================================
// RUN ALL TESTS
// =============================================================================

pub fn run_all_tests(ctx: &TestContext) {
    println!("\n🛡️ Running Secure Entity Tests\n");

    test_eager_wrapper_checks_on_creation(ctx);
    test_lazy_wrapper_checks_on_first_read(ctx);
    test_flush_checks_new_state(ctx);
    test_disabled_checks(ctx);
    test_delayed_checks(ctx);

    println!("\n✅ All Secure Entity tests passed!\n");
}
