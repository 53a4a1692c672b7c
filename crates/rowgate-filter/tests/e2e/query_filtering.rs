//! Query rewriting tests for rowgate.
//!
//! Tests the rewritten query text, its parameters and the rows the rewritten
//! query returns from the store:
//! - Principal-based rules
//! - Entities without rules and rules that always hold
//! - Several rules per entity and rules along an inheritance tree
//! - Several selected entities, outer joins, subselects in rules
//! - Role parameters, DELETE statements, parameter name collisions

use super::common::*;
use pretty_assertions::assert_eq;
use rowgate_core::{AccessType, StaticSecurityContext, Value};
use rowgate_filter::FilterOutcome;

// =============================================================================
// PRINCIPAL RULES
// =============================================================================

pub fn test_owner_rule_restricts_contacts(ctx: &TestContext) {
    println!("  🧪 test_owner_rule_restricts_contacts");

    let result = ctx
        .filter()
        .filter_query(
            "SELECT contact FROM Contact contact",
            AccessType::Read,
            &ctx.as_john(),
        )
        .unwrap();

    assert_eq!(result.outcome, FilterOutcome::Rewritten);
    assert_eq!(
        result.query,
        "SELECT contact FROM Contact contact WHERE contact.owner = :param0"
    );
    assert_eq!(result.user_parameter_name.as_deref(), Some("param0"));
    assert_eq!(
        result.parameters.get("param0"),
        Some(&Value::Entity(ctx.john.clone()))
    );
    assert_eq!(ids(&ctx.run(&result)), vec![1, 2]);

    println!("     ✓ John sees his two contacts");

    let result = ctx
        .filter()
        .filter_query(
            "SELECT contact FROM Contact contact",
            AccessType::Read,
            &ctx.as_mary(),
        )
        .unwrap();
    assert_eq!(ids(&ctx.run(&result)), vec![3, 4]);

    println!("     ✓ Mary sees hers");
}

pub fn test_selected_property_restricts_its_entity(ctx: &TestContext) {
    println!("  🧪 test_selected_property_restricts_its_entity");

    let result = ctx
        .filter()
        .filter_query("SELECT c.name FROM Contact c", AccessType::Read, &ctx.as_john())
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT c.name FROM Contact c WHERE c.owner = :param0"
    );
    let mut names: Vec<String> = ctx
        .run(&result)
        .iter()
        .filter_map(|row| row.as_str().map(str::to_string))
        .collect();
    names.sort();
    assert_eq!(names, vec!["Alice", "Bob"]);

    let result = ctx
        .filter()
        .filter_query("SELECT c.owner FROM Contact c", AccessType::Read, &ctx.as_john())
        .unwrap();
    assert_eq!(result.outcome, FilterOutcome::Unchanged);

    println!("     ✓ Property selections are restricted, unrestricted targets are not");
}

// =============================================================================
// UNRESTRICTED QUERIES
// =============================================================================

pub fn test_entity_without_rules_is_unchanged(ctx: &TestContext) {
    println!("  🧪 test_entity_without_rules_is_unchanged");

    let query = "SELECT   v FROM Vet   v WHERE v.name LIKE 'Dr.%'";
    let result = ctx
        .filter()
        .filter_query(query, AccessType::Read, &ctx.as_john())
        .unwrap();

    assert_eq!(result.outcome, FilterOutcome::Unchanged);
    assert_eq!(result.query, query);
    assert!(result.parameters.is_empty());
    assert_eq!(ids(&ctx.run(&result)), vec![1, 2]);

    println!("     ✓ Query text is returned byte for byte");
}

pub fn test_tautology_rule_is_dropped(ctx: &TestContext) {
    println!("  🧪 test_tautology_rule_is_dropped");

    let query = "SELECT h FROM Holiday h";
    let result = ctx
        .filter()
        .filter_query(query, AccessType::Read, &ctx.as_john())
        .unwrap();
    assert_eq!(result.outcome, FilterOutcome::Unchanged);
    assert_eq!(result.query, query);

    println!("     ✓ A rule that always holds adds no predicate");
}

pub fn test_role_rule_decided_in_memory(ctx: &TestContext) {
    println!("  🧪 test_role_rule_decided_in_memory");

    let query = "SELECT clinic FROM Clinic clinic";
    let admin = StaticSecurityContext::new(ctx.john.clone()).with_role("admin");
    let result = ctx
        .filter()
        .filter_query(query, AccessType::Read, &admin)
        .unwrap();
    assert_eq!(result.outcome, FilterOutcome::Unchanged);
    assert_eq!(result.query, query);

    let result = ctx
        .filter()
        .filter_query(query, AccessType::Read, &ctx.as_john())
        .unwrap();
    assert_eq!(result.outcome, FilterOutcome::AlwaysEmpty);
    assert!(result.is_always_empty());
    assert!(ctx.run(&result).is_empty());

    println!("     ✓ Admins query unrestricted, everyone else gets no rows");
}

// =============================================================================
// SEVERAL RULES
// =============================================================================

pub fn test_rules_are_disjoined(ctx: &TestContext) {
    println!("  🧪 test_rules_are_disjoined");

    let result = ctx
        .filter()
        .filter_query("SELECT b FROM TestBean b", AccessType::Read, &ctx.as_john())
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT b FROM TestBean b WHERE (b.id = 1 OR b.id = 2)"
    );
    assert!(result.parameters.is_empty());
    assert_eq!(ids(&ctx.run(&result)), vec![1, 2]);

    println!("     ✓ Either rule grants access");
}

pub fn test_query_alias_is_independent_of_rule_alias(ctx: &TestContext) {
    println!("  🧪 test_query_alias_is_independent_of_rule_alias");

    let result = ctx
        .filter()
        .filter_query(
            "SELECT bean FROM TestBean bean",
            AccessType::Read,
            &ctx.as_john(),
        )
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT bean FROM TestBean bean WHERE (bean.id = 1 OR bean.id = 2)"
    );

    let result = ctx
        .filter()
        .filter_query("SELECT c FROM TestBean c", AccessType::Read, &ctx.as_john())
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT c FROM TestBean c WHERE (c.id = 1 OR c.id = 2)"
    );

    println!("     ✓ Rule aliases are substituted by the query's");
}

pub fn test_existing_disjunction_is_parenthesized(ctx: &TestContext) {
    println!("  🧪 test_existing_disjunction_is_parenthesized");

    let result = ctx
        .filter()
        .filter_query(
            "SELECT b FROM TestBean b WHERE b.id = 3 OR b.id = 1",
            AccessType::Read,
            &ctx.as_john(),
        )
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT b FROM TestBean b WHERE (b.id = 3 OR b.id = 1) AND (b.id = 1 OR b.id = 2)"
    );
    assert_eq!(ids(&ctx.run(&result)), vec![1]);

    println!("     ✓ The user's OR keeps its meaning");
}

pub fn test_filtering_is_idempotent(ctx: &TestContext) {
    println!("  🧪 test_filtering_is_idempotent");

    let filter = ctx.filter();
    let first = filter
        .filter_query("SELECT b FROM TestBean b", AccessType::Read, &ctx.as_john())
        .unwrap();
    let second = filter
        .filter_query(&first.query, AccessType::Read, &ctx.as_john())
        .unwrap();
    assert_eq!(second.outcome, FilterOutcome::Unchanged);
    assert_eq!(second.query, first.query);

    println!("     ✓ Filtering a filtered query adds nothing");
}

// =============================================================================
// INHERITANCE
// =============================================================================

pub fn test_subclass_rules_are_guarded_by_type(ctx: &TestContext) {
    println!("  🧪 test_subclass_rules_are_guarded_by_type");

    let result = ctx
        .filter()
        .filter_query("SELECT a FROM Animal a", AccessType::Read, &ctx.as_john())
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT a FROM Animal a WHERE (TYPE(a) IN (Animal) AND a.owner = :param0 \
         OR TYPE(a) IN (Dog) AND (a.owner = :param0 OR a.good = TRUE))"
    );
    assert_eq!(result.parameters.len(), 1);
    // Fluffy is John's, Rex is a good dog.
    assert_eq!(ids(&ctx.run(&result)), vec![1, 3]);

    println!("     ✓ Dogs are also visible through the Dog rule");

    let result = ctx
        .filter()
        .filter_query("SELECT d FROM Dog d", AccessType::Read, &ctx.as_john())
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT d FROM Dog d WHERE (d.owner = :param0 OR d.good = TRUE)"
    );
    assert_eq!(ids(&ctx.run(&result)), vec![3]);

    println!("     ✓ Inherited rules apply to subclass queries");
}

// =============================================================================
// SEVERAL SELECTED ENTITIES
// =============================================================================

pub fn test_each_selected_entity_is_restricted(ctx: &TestContext) {
    println!("  🧪 test_each_selected_entity_is_restricted");

    let result = ctx
        .filter()
        .filter_query(
            "SELECT c, b FROM Contact c, TestBean b",
            AccessType::Read,
            &ctx.as_john(),
        )
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT c, b FROM Contact c, TestBean b WHERE (c.owner = :param0) AND (b.id = 1 OR b.id = 2)"
    );
    assert_eq!(ctx.run(&result).len(), 4);

    println!("     ✓ Clauses are conjoined");
}

pub fn test_outer_joined_entity_may_be_missing(ctx: &TestContext) {
    println!("  🧪 test_outer_joined_entity_may_be_missing");

    let result = ctx
        .filter()
        .filter_query(
            "SELECT u, c FROM User u LEFT JOIN u.contacts c",
            AccessType::Read,
            &ctx.as_john(),
        )
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT u, c FROM User u LEFT JOIN u.contacts c WHERE (c IS NULL OR c.owner = :param0)"
    );

    let rows = ctx.run(&result);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().any(|row| {
        row == &Value::Collection(vec![Value::Entity(ctx.ann.clone()), Value::Null])
    }));

    println!("     ✓ Users without contacts keep their row");
}

// =============================================================================
// SUBSELECTS IN RULES
// =============================================================================

pub fn test_subselect_rule_is_embedded(ctx: &TestContext) {
    println!("  🧪 test_subselect_rule_is_embedded");

    let result = ctx
        .filter()
        .filter_query("SELECT n FROM Note n", AccessType::Read, &ctx.as_john())
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT n FROM Note n WHERE EXISTS (SELECT u FROM User u WHERE u = :param0 AND u.name = n.author)"
    );
    assert_eq!(ids(&ctx.run(&result)), vec![1]);

    println!("     ✓ The subselect runs inside the rewritten query");

    let result = ctx
        .filter()
        .filter_query("SELECT u FROM Note u", AccessType::Read, &ctx.as_john())
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT u FROM Note u WHERE EXISTS (SELECT u1 FROM User u1 WHERE u1 = :param0 AND u1.name = u.author)"
    );
    assert_eq!(ids(&ctx.run(&result)), vec![1]);

    println!("     ✓ Colliding subselect aliases are renamed");
}

// =============================================================================
// ROLES AND PARAMETERS
// =============================================================================

pub fn test_roles_become_parameters(ctx: &TestContext) {
    println!("  🧪 test_roles_become_parameters");

    let auditor = StaticSecurityContext::new(ctx.john.clone()).with_roles(["sales", "audit"]);
    let result = ctx
        .filter()
        .filter_query("SELECT r FROM Report r", AccessType::Read, &auditor)
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT r FROM Report r WHERE r.role IN (:param0, :param1)"
    );
    assert_eq!(result.role_parameter_names, vec!["param0", "param1"]);
    assert_eq!(result.user_parameter_name, None);
    assert_eq!(ids(&ctx.run(&result)), vec![1, 2]);

    let sales = StaticSecurityContext::new(ctx.john.clone()).with_role("sales");
    let result = ctx
        .filter()
        .filter_query("SELECT r FROM Report r", AccessType::Read, &sales)
        .unwrap();
    assert_eq!(ids(&ctx.run(&result)), vec![1]);

    println!("     ✓ One parameter per role");

    let result = ctx
        .filter()
        .filter_query("SELECT r FROM Report r", AccessType::Read, &ctx.as_john())
        .unwrap();
    assert_eq!(result.outcome, FilterOutcome::AlwaysEmpty);

    println!("     ✓ No roles, no reports");
}

pub fn test_query_parameters_are_not_reused(ctx: &TestContext) {
    println!("  🧪 test_query_parameters_are_not_reused");

    let result = ctx
        .filter()
        .filter_query(
            "SELECT contact FROM Contact contact WHERE contact.name = :param0",
            AccessType::Read,
            &ctx.as_john(),
        )
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT contact FROM Contact contact WHERE contact.name = :param0 AND contact.owner = :param1"
    );
    assert_eq!(result.parameters.keys().collect::<Vec<_>>(), vec!["param1"]);

    println!("     ✓ Generated parameters avoid the query's names");
}

pub fn test_delete_is_restricted(ctx: &TestContext) {
    println!("  🧪 test_delete_is_restricted");

    let result = ctx
        .filter()
        .filter_query(
            "DELETE FROM TestBean bean WHERE bean.id > 2",
            AccessType::Delete,
            &ctx.as_john(),
        )
        .unwrap();
    assert_eq!(
        result.query,
        "DELETE FROM TestBean bean WHERE bean.id > 2 AND bean.id = 4"
    );

    println!("     ✓ DELETE statements get the DELETE rules");
}

// =============================================================================
// RUN ALL TESTS
// =============================================================================

pub fn run_all_tests(ctx: &TestContext) {
    println!("\n🔎 Running Query Filtering Tests\n");

    test_owner_rule_restricts_contacts(ctx);
    test_selected_property_restricts_its_entity(ctx);
    test_entity_without_rules_is_unchanged(ctx);
    test_tautology_rule_is_dropped(ctx);
    test_role_rule_decided_in_memory(ctx);
    test_rules_are_disjoined(ctx);
    test_query_alias_is_independent_of_rule_alias(ctx);
    test_existing_disjunction_is_parenthesized(ctx);
    test_filtering_is_idempotent(ctx);
    test_subclass_rules_are_guarded_by_type(ctx);
    test_each_selected_entity_is_restricted(ctx);
    test_outer_joined_entity_may_be_missing(ctx);
    test_subselect_rule_is_embedded(ctx);
    test_roles_become_parameters(ctx);
    test_query_parameters_are_not_reused(ctx);
    test_delete_is_restricted(ctx);

    println!("\n✅ All Query Filtering tests passed!\n");
}
