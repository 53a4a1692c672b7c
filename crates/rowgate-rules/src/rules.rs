//! The compiled rule set.

use rowgate_core::{AccessType, ClassMappingInformation, MappingInformation, SecurityConfig};
use std::sync::Arc;

use crate::compiler::{AccessRulesCompiler, parse_rule_text};
use crate::error::CompileError;
use crate::resolver::{AliasResolver, SecurityContextAliasTypes};
use crate::rule::CompiledAccessRule;
use crate::source::{permit_rule, roles_allowed_rules};

/// All compiled access rules of one mapping.
///
/// Built once and shared through `Arc`; nothing in it changes afterwards.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    resolver: AliasResolver,
    rules: Vec<CompiledAccessRule>,
}

impl CompiledRules {
    pub fn new(resolver: AliasResolver, rules: Vec<CompiledAccessRule>) -> Self {
        Self { resolver, rules }
    }

    /// Compile the textual rules and entity declarations of `config`.
    ///
    /// When the configuration names a principal entity, `CURRENT_PRINCIPAL`
    /// is typed as that entity.
    pub fn from_config(
        config: &SecurityConfig,
        mapping: Arc<MappingInformation>,
    ) -> Result<Self, CompileError> {
        let mut resolver = AliasResolver::new(mapping.clone());
        if let Some(class) = config
            .principal
            .entity
            .as_deref()
            .and_then(|entity| mapping.class_mapping(entity))
        {
            resolver = resolver.with_external_alias_types(Arc::new(
                SecurityContextAliasTypes::with_principal_entity(class.clone()),
            ));
        }

        let mut sources = config
            .rules
            .iter()
            .map(|text| parse_rule_text(text))
            .collect::<Result<Vec<_>, _>>()?;

        for entity in &config.entities {
            let Some(class) = mapping.class_mapping(&entity.name) else {
                tracing::warn!(entity = %entity.name, "ignoring access declarations of unmapped entity");
                continue;
            };
            for statement in roles_allowed_rules(class, &entity.roles_allowed) {
                let source = statement.to_string();
                sources.push((statement, source));
            }
            for permit in &entity.permit {
                let statement = permit_rule(class, permit, &resolver)?;
                sources.push((statement, permit.rule.clone()));
            }
        }

        let compiler = AccessRulesCompiler::new(resolver);
        let rules = compiler.compile_sourced(sources)?;
        tracing::debug!(rules = rules.len(), "compiled access rules");
        Ok(Self::new(compiler.resolver().clone(), rules))
    }

    pub fn resolver(&self) -> &AliasResolver {
        &self.resolver
    }

    pub fn mapping(&self) -> &Arc<MappingInformation> {
        self.resolver.mapping()
    }

    pub fn rules(&self) -> &[CompiledAccessRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules granting `access_type` whose target is `class` or one of its
    /// ancestors, in declaration order.
    pub fn rules_for(
        &self,
        class: &ClassMappingInformation,
        access_type: AccessType,
    ) -> Vec<&CompiledAccessRule> {
        self.rules
            .iter()
            .filter(|rule| rule.grants(access_type) && rule.applies_to(class))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r#"
principal:
  entity: User
entities:
  - name: User
    id: [id]
    properties:
      id: { type: Long }
      name: { type: String }
  - name: Contact
    id: [id]
    properties:
      id: { type: Long }
      owner: { type: User, kind: one }
    roles_allowed:
      - roles: [admin]
    permit:
      - where: owner = CURRENT_PRINCIPAL
        access: [READ]
  - name: Customer
    superclass: Contact
    properties:
      discount: { type: Integer }
  - name: Vet
    id: [id]
    properties:
      id: { type: Long }
rules:
  - GRANT READ ACCESS TO Contact c WHERE c.owner.name = 'shared'
  - GRANT READ ACCESS TO Customer c WHERE c.discount > 10
"#;

    fn rules() -> CompiledRules {
        let config = SecurityConfig::from_yaml(CONFIG).unwrap();
        let mapping = Arc::new(MappingInformation::from_config(&config.entities).unwrap());
        CompiledRules::from_config(&config, mapping).unwrap()
    }

    fn texts(rules: Vec<&CompiledAccessRule>) -> Vec<String> {
        rules.iter().map(|rule| rule.where_clause().to_string()).collect()
    }

    #[test]
    fn test_from_config() {
        let rules = rules();
        assert_eq!(rules.len(), 4);
        let contact = rules.mapping().class_mapping("Contact").unwrap().clone();
        assert_eq!(
            texts(rules.rules_for(&contact, AccessType::Read)),
            vec![
                "c.owner.name = 'shared'",
                "'admin' IN (CURRENT_ROLES)",
                "contact.owner = CURRENT_PRINCIPAL",
            ]
        );
        assert_eq!(
            texts(rules.rules_for(&contact, AccessType::Delete)),
            vec!["'admin' IN (CURRENT_ROLES)"]
        );
    }

    #[test]
    fn test_subclass_inherits_rules() {
        let rules = rules();
        let customer = rules.mapping().class_mapping("Customer").unwrap().clone();
        assert_eq!(rules.rules_for(&customer, AccessType::Read).len(), 4);
        let vet = rules.mapping().class_mapping("Vet").unwrap().clone();
        assert!(rules.rules_for(&vet, AccessType::Read).is_empty());
    }

    #[test]
    fn test_principal_typed_by_config() {
        let config = SecurityConfig::from_yaml(
            r#"
principal:
  entity: User
entities:
  - name: User
    id: [id]
    properties:
      id: { type: Long }
  - name: Contact
    id: [id]
    properties:
      id: { type: Long }
rules:
  - GRANT READ ACCESS TO Contact c WHERE CURRENT_PRINCIPAL.nickname = 'x'
"#,
        )
        .unwrap();
        let mapping = Arc::new(MappingInformation::from_config(&config.entities).unwrap());
        assert!(matches!(
            CompiledRules::from_config(&config, mapping),
            Err(CompileError::InvalidRule { .. })
        ));
    }
}
