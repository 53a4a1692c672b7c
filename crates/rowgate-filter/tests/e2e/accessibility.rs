//! Entity accessibility tests for rowgate.
//!
//! Tests in-memory evaluation of access rules against loaded entities:
//! - Principal rules, entities without rules, role rules
//! - Rules along an inheritance tree
//! - Rules with subselects: in-memory, delegated to the executor, undecided

use super::common::*;
use pretty_assertions::assert_eq;
use rowgate_core::{AccessType, EvaluationConfig, StaticSecurityContext};
use rowgate_filter::{EntityFilter, FilterError};
use std::sync::Arc;

// =============================================================================
// PRINCIPAL AND ROLE RULES
// =============================================================================

pub fn test_contact_accessible_to_owner_only(ctx: &TestContext) {
    println!("  🧪 test_contact_accessible_to_owner_only");

    let filter = ctx.filter();
    let alice = ctx.entity("Contact", 1);

    assert!(filter
        .is_accessible(AccessType::Read, &alice, &ctx.as_john())
        .unwrap());
    assert!(!filter
        .is_accessible(AccessType::Read, &alice, &ctx.as_mary())
        .unwrap());

    println!("     ✓ Alice is John's contact");

    let error = filter
        .check_access(AccessType::Read, &alice, &ctx.as_mary())
        .unwrap_err();
    assert!(matches!(
        error,
        FilterError::AccessDenied { ref entity, access_type: AccessType::Read } if entity == "Contact"
    ));

    println!("     ✓ check_access reports the denial");
}

pub fn test_entity_without_rules_is_accessible(ctx: &TestContext) {
    println!("  🧪 test_entity_without_rules_is_accessible");

    let vet = ctx.entity("Vet", 1);
    assert!(ctx
        .filter()
        .is_accessible(AccessType::Read, &vet, &ctx.as_mary())
        .unwrap());

    // No DELETE rule for contacts either.
    let alice = ctx.entity("Contact", 1);
    assert!(ctx
        .filter()
        .is_accessible(AccessType::Delete, &alice, &ctx.as_mary())
        .unwrap());

    println!("     ✓ Access without a granting rule is not restricted");
}

pub fn test_role_rules(ctx: &TestContext) {
    println!("  🧪 test_role_rules");

    let clinic = ctx.entity("Clinic", 1);
    let admin = StaticSecurityContext::new(ctx.john.clone()).with_role("admin");
    let filter = ctx.filter();

    assert!(filter.is_accessible(AccessType::Read, &clinic, &admin).unwrap());
    assert!(!filter
        .is_accessible(AccessType::Read, &clinic, &ctx.as_john())
        .unwrap());

    let report = ctx.entity("Report", 2);
    let auditor = StaticSecurityContext::new(ctx.john.clone()).with_role("audit");
    assert!(filter.is_accessible(AccessType::Read, &report, &auditor).unwrap());
    assert!(!filter.is_accessible(AccessType::Read, &report, &admin).unwrap());

    println!("     ✓ roles_allowed and permit declarations are enforced");
}

pub fn test_subclass_rules(ctx: &TestContext) {
    println!("  🧪 test_subclass_rules");

    let filter = ctx.filter();
    let fluffy = ctx.entity("Animal", 1);
    let rex = ctx.entity("Dog", 3);
    let spike = ctx.entity("Dog", 4);

    assert!(filter
        .is_accessible(AccessType::Read, &fluffy, &ctx.as_john())
        .unwrap());
    assert!(!filter
        .is_accessible(AccessType::Read, &fluffy, &ctx.as_mary())
        .unwrap());
    assert!(filter
        .is_accessible(AccessType::Read, &rex, &ctx.as_john())
        .unwrap());
    assert!(!filter
        .is_accessible(AccessType::Read, &spike, &ctx.as_john())
        .unwrap());
    assert!(filter
        .is_accessible(AccessType::Read, &spike, &ctx.as_mary())
        .unwrap());

    println!("     ✓ Dogs are accessible through either rule");
}

// =============================================================================
// SUBSELECT RULES
// =============================================================================

pub fn test_undecided_subselect_denies(ctx: &TestContext) {
    println!("  🧪 test_undecided_subselect_denies");

    let note = ctx.entity("Note", 1);
    assert!(!ctx
        .standalone_filter()
        .is_accessible(AccessType::Read, &note, &ctx.as_john())
        .unwrap());

    println!("     ✓ Without executor or entity source the rule does not grant");

    let filter = ctx.filter().with_evaluation_config(EvaluationConfig {
        delegate_subselects: false,
        ..EvaluationConfig::default()
    });
    let opened = ctx.executor.stats.opened();
    assert!(!filter
        .is_accessible(AccessType::Read, &note, &ctx.as_john())
        .unwrap());
    assert_eq!(ctx.executor.stats.opened(), opened);

    println!("     ✓ Disabled delegation opens no session");
}

pub fn test_subselect_delegated_to_executor(ctx: &TestContext) {
    println!("  🧪 test_subselect_delegated_to_executor");

    let stats = &ctx.executor.stats;
    let opened = stats.opened();
    let rolled_back = stats.rolled_back();
    let closed = stats.closed();
    let queries = stats.queries();

    let filter = ctx.filter();
    assert!(filter
        .is_accessible(AccessType::Read, &ctx.entity("Note", 1), &ctx.as_john())
        .unwrap());
    assert!(!filter
        .is_accessible(AccessType::Read, &ctx.entity("Note", 2), &ctx.as_john())
        .unwrap());

    assert_eq!(stats.opened() - opened, 2);
    assert_eq!(stats.queries() - queries, 2);
    assert_eq!(stats.rolled_back() - rolled_back, 2);
    assert_eq!(stats.closed() - closed, 2);

    println!("     ✓ Each delegated subselect ran in its own rolled back session");
}

pub fn test_subselect_decided_from_entity_source(ctx: &TestContext) {
    println!("  🧪 test_subselect_decided_from_entity_source");

    let opened = ctx.executor.stats.opened();
    let filter = EntityFilter::new(ctx.rules.clone()).with_entity_source(ctx.store.clone());
    assert!(filter
        .is_accessible(AccessType::Read, &ctx.entity("Note", 1), &ctx.as_john())
        .unwrap());
    assert!(!filter
        .is_accessible(AccessType::Read, &ctx.entity("Note", 1), &ctx.as_mary())
        .unwrap());
    assert_eq!(ctx.executor.stats.opened(), opened);

    println!("     ✓ Entity ranges are read from the entity source");
}

pub fn test_executor_failure_is_an_error(ctx: &TestContext) {
    println!("  🧪 test_executor_failure_is_an_error");

    let filter = EntityFilter::new(ctx.rules.clone()).with_executor(Arc::new(UnavailableExecutor));
    let result = filter.is_accessible(AccessType::Read, &ctx.entity("Note", 1), &ctx.as_john());
    assert!(matches!(result, Err(FilterError::Executor(_))));

    println!("     ✓ Executor errors are reported, not granted");
}

// =============================================================================
// RUN ALL TESTS
// =============================================================================

pub fn run_all_tests(ctx: &TestContext) {
    println!("\n🔐 Running Accessibility Tests\n");

    test_contact_accessible_to_owner_only(ctx);
    test_entity_without_rules_is_accessible(ctx);
    test_role_rules(ctx);
    test_subclass_rules(ctx);
    test_undecided_subselect_denies(ctx);
    test_subselect_delegated_to_executor(ctx);
    test_subselect_decided_from_entity_source(ctx);
    test_executor_failure_is_an_error(ctx);

    println!("\n✅ All Accessibility tests passed!\n");
}
