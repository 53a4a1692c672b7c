//! Configuration loading tests for rowgate.
//!
//! Tests that rules kept in separate rule files are compiled and enforced
//! together with the inline rules of the main configuration file.

use super::common::*;
use pretty_assertions::assert_eq;
use rowgate_core::{AccessType, MappingInformation, SecurityConfig};
use rowgate_filter::EntityFilter;
use rowgate_rules::CompiledRules;
use std::fs;
use std::sync::Arc;

pub fn test_rule_files_are_enforced(ctx: &TestContext) {
    println!("  🧪 test_rule_files_are_enforced");

    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("rules")).unwrap();
    fs::write(
        dir.path().join("rules/vets.yaml"),
        "rules:\n  - GRANT READ ACCESS TO Vet v WHERE v.name = 'Dr. Watson'\n",
    )
    .unwrap();
    let config_path = dir.path().join("rowgate.yaml");
    fs::write(
        &config_path,
        format!("{CONFIG}rule_files:\n  - rules/vets.yaml\n"),
    )
    .unwrap();

    let config = SecurityConfig::load_with_context(&config_path).unwrap();
    let mapping = Arc::new(MappingInformation::from_config(&config.entities).unwrap());
    let rules = CompiledRules::from_config(&config, mapping).unwrap();
    assert_eq!(rules.len(), ctx.rules.len() + 1);

    let filter = EntityFilter::new(Arc::new(rules));
    let result = filter
        .filter_query("SELECT v FROM Vet v", AccessType::Read, &ctx.as_john())
        .unwrap();
    assert_eq!(
        result.query,
        "SELECT v FROM Vet v WHERE v.name = 'Dr. Watson'"
    );
    assert_eq!(ids(&ctx.run(&result)), vec![2]);

    println!("     ✓ Rules from rule files restrict queries");
}

pub fn run_all_tests(ctx: &TestContext) {
    println!("\n📜 Running Configuration Tests\n");

    test_rule_files_are_enforced(ctx);

    println!("\n✅ All Configuration tests passed!\n");
}
