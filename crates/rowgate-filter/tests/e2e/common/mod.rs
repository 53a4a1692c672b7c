//! Shared test infrastructure for rowgate end-to-end tests.
//!
//! This module provides:
//! - The mapped domain (users, contacts, pets, notes, ...) and its GRANT rules
//! - An in-memory store standing in for the database
//! - A query executor that runs rewritten queries against the store
//! - Helper functions for test assertions

use anyhow::Result;
use rowgate_core::{
    EntityRef, MappingInformation, SecurityConfig, StaticSecurityContext, Value,
};
use rowgate_filter::{
    EntityFilter, EntitySource, ExecutorSession, FilterResult, QueryEvaluationParameters,
    QueryEvaluator, QueryExecutor, QueryHandle,
};
use rowgate_query::{SelectStatement, parse_select};
use rowgate_rules::CompiledRules;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// DOMAIN CONFIGURATION
// =============================================================================

pub const CONFIG: &str = r#"
principal:
  entity: User
entities:
  - name: User
    id: [id]
    properties:
      id: { type: Long }
      name: { type: String }
      contacts: { type: Contact, kind: many }
  - name: Contact
    id: [id]
    properties:
      id: { type: Long }
      name: { type: String }
      owner: { type: User, kind: one }
  - name: Vet
    id: [id]
    properties:
      id: { type: Long }
      name: { type: String }
  - name: TestBean
    id: [id]
    properties:
      id: { type: Long }
  - name: Animal
    id: [id]
    properties:
      id: { type: Long }
      name: { type: String }
      owner: { type: User, kind: one }
  - name: Dog
    superclass: Animal
    properties:
      good: { type: Boolean }
  - name: Note
    id: [id]
    properties:
      id: { type: Long }
      author: { type: String }
  - name: Holiday
    id: [id]
    properties:
      id: { type: Long }
  - name: Clinic
    id: [id]
    properties:
      id: { type: Long }
    roles_allowed:
      - roles: [admin]
        access: [READ]
  - name: Report
    id: [id]
    properties:
      id: { type: Long }
      role: { type: String }
    permit:
      - where: role IN (CURRENT_ROLES)
        access: [READ]
rules:
  - GRANT READ UPDATE ACCESS TO Contact c WHERE c.owner = CURRENT_PRINCIPAL
  - GRANT READ ACCESS TO TestBean b WHERE b.id = 1
  - GRANT READ ACCESS TO TestBean b WHERE b.id = 2
  - GRANT DELETE ACCESS TO TestBean b WHERE b.id = 4
  - GRANT READ ACCESS TO Animal a WHERE a.owner = CURRENT_PRINCIPAL
  - GRANT READ ACCESS TO Dog d WHERE d.good = TRUE
  - GRANT READ ACCESS TO Note n WHERE EXISTS (SELECT u FROM User u WHERE u = CURRENT_PRINCIPAL AND u.name = n.author)
  - GRANT READ ACCESS TO Holiday h WHERE 1 = 1
"#;

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// All persisted instances.
pub struct Store {
    mapping: Arc<MappingInformation>,
    entities: Vec<EntityRef>,
}

impl EntitySource for Store {
    fn entities(&self, entity_name: &str) -> Vec<Value> {
        self.entities
            .iter()
            .filter(|entity| self.mapping.is_assignable(entity.entity_name(), entity_name))
            .cloned()
            .map(Value::Entity)
            .collect()
    }
}

// =============================================================================
// IN-MEMORY QUERY EXECUTOR
// =============================================================================

/// Session bookkeeping, to verify secondary sessions are released.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub opened: AtomicUsize,
    pub begun: AtomicUsize,
    pub rolled_back: AtomicUsize,
    pub closed: AtomicUsize,
    pub queries: AtomicUsize,
}

impl SessionStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

/// Runs queries with the in-memory evaluator over the store.
pub struct InMemoryExecutor {
    evaluator: QueryEvaluator,
    pub stats: Arc<SessionStats>,
}

impl QueryExecutor for InMemoryExecutor {
    fn open_session(&self) -> Result<Box<dyn ExecutorSession>> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemorySession {
            evaluator: self.evaluator.clone(),
            stats: self.stats.clone(),
        }))
    }
}

struct InMemorySession {
    evaluator: QueryEvaluator,
    stats: Arc<SessionStats>,
}

impl ExecutorSession for InMemorySession {
    fn begin(&mut self) -> Result<()> {
        self.stats.begun.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create_query(&mut self, query: &str) -> Result<Box<dyn QueryHandle + '_>> {
        self.stats.queries.fetch_add(1, Ordering::SeqCst);
        let select = parse_select(query)?;
        Ok(Box::new(InMemoryQuery {
            evaluator: &self.evaluator,
            select,
            params: QueryEvaluationParameters::new(),
        }))
    }

    fn rollback(&mut self) -> Result<()> {
        self.stats.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct InMemoryQuery<'a> {
    evaluator: &'a QueryEvaluator,
    select: SelectStatement,
    params: QueryEvaluationParameters,
}

impl QueryHandle for InMemoryQuery<'_> {
    fn set_parameter(&mut self, name: &str, value: Value) -> Result<()> {
        self.params.set_parameter(name, value);
        Ok(())
    }

    fn get_result_list(&mut self) -> Result<Vec<Value>> {
        Ok(self.evaluator.evaluate_select(&self.select, &self.params)?)
    }
}

/// Executor whose sessions cannot be opened.
pub struct UnavailableExecutor;

impl QueryExecutor for UnavailableExecutor {
    fn open_session(&self) -> Result<Box<dyn ExecutorSession>> {
        anyhow::bail!("connection refused")
    }
}

// =============================================================================
// TEST CONTEXT
// =============================================================================

/// Test context holding the compiled rules, the store and its fixtures.
pub struct TestContext {
    pub rules: Arc<CompiledRules>,
    pub store: Arc<Store>,
    pub executor: Arc<InMemoryExecutor>,
    pub john: EntityRef,
    pub mary: EntityRef,
    pub ann: EntityRef,
}

impl TestContext {
    pub fn setup() -> Self {
        let config = SecurityConfig::from_yaml(CONFIG).expect("Failed to parse configuration");
        let mapping = Arc::new(
            MappingInformation::from_config(&config.entities).expect("Failed to build mapping"),
        );
        let rules = Arc::new(
            CompiledRules::from_config(&config, mapping.clone()).expect("Failed to compile rules"),
        );

        let john = user(1, "John");
        let mary = user(2, "Mary");
        let ann = user(3, "Ann");

        let mut entities = vec![john.clone(), mary.clone(), ann.clone()];

        let john_contacts = vec![contact(1, "Alice", &john), contact(2, "Bob", &john)];
        let mary_contacts = vec![contact(3, "Carol", &mary), contact(4, "Dave", &mary)];
        john.set("contacts", entity_values(&john_contacts));
        mary.set("contacts", entity_values(&mary_contacts));
        ann.set("contacts", Value::Collection(Vec::new()));
        entities.extend(john_contacts);
        entities.extend(mary_contacts);

        entities.extend((1..=4).map(|id| EntityRef::new("TestBean").with("id", id)));
        entities.push(EntityRef::new("Vet").with("id", 1).with("name", "Dr. Dolittle"));
        entities.push(EntityRef::new("Vet").with("id", 2).with("name", "Dr. Watson"));

        entities.push(animal(1, "Fluffy", &john));
        entities.push(animal(2, "Tom", &mary));
        entities.push(dog(3, "Rex", &mary, true));
        entities.push(dog(4, "Spike", &mary, false));

        entities.push(note(1, "John"));
        entities.push(note(2, "Mary"));

        entities.push(EntityRef::new("Holiday").with("id", 1));
        entities.push(EntityRef::new("Clinic").with("id", 1));
        entities.push(report(1, "sales"));
        entities.push(report(2, "audit"));

        let store = Arc::new(Store {
            mapping: mapping.clone(),
            entities,
        });
        let executor = Arc::new(InMemoryExecutor {
            evaluator: QueryEvaluator::new(mapping).with_entity_source(store.clone()),
            stats: Arc::new(SessionStats::default()),
        });

        Self {
            rules,
            store,
            executor,
            john,
            mary,
            ann,
        }
    }

    /// Filter backed by the in-memory executor.
    pub fn filter(&self) -> EntityFilter {
        EntityFilter::new(self.rules.clone()).with_executor(self.executor.clone())
    }

    /// Filter with neither executor nor entity source.
    pub fn standalone_filter(&self) -> EntityFilter {
        EntityFilter::new(self.rules.clone())
    }

    pub fn as_john(&self) -> StaticSecurityContext {
        StaticSecurityContext::new(self.john.clone())
    }

    pub fn as_mary(&self) -> StaticSecurityContext {
        StaticSecurityContext::new(self.mary.clone())
    }

    /// Run a filter result against the store the way a caller would.
    pub fn run(&self, result: &FilterResult) -> Vec<Value> {
        if result.is_always_empty() {
            return Vec::new();
        }
        let mut session = self
            .executor
            .open_session()
            .expect("Failed to open session");
        session.begin().expect("Failed to begin");
        let rows = {
            let mut query = session
                .create_query(&result.query)
                .expect("Failed to create query");
            for (name, value) in &result.parameters {
                query
                    .set_parameter(name, value.clone())
                    .expect("Failed to bind parameter");
            }
            query.get_result_list().expect("Failed to run query")
        };
        session.rollback().expect("Failed to roll back");
        session.close().expect("Failed to close");
        rows
    }

    /// Entity of the given name and id from the store.
    pub fn entity(&self, entity_name: &str, id: i64) -> EntityRef {
        self.store
            .entities
            .iter()
            .find(|entity| {
                entity.entity_name() == entity_name && entity.get("id") == Some(Value::Integer(id))
            })
            .cloned()
            .unwrap_or_else(|| panic!("no {entity_name} with id {id}"))
    }
}

// =============================================================================
// FIXTURE BUILDERS
// =============================================================================

pub fn user(id: i64, name: &str) -> EntityRef {
    EntityRef::new("User").with("id", id).with("name", name)
}

pub fn contact(id: i64, name: &str, owner: &EntityRef) -> EntityRef {
    EntityRef::new("Contact")
        .with("id", id)
        .with("name", name)
        .with("owner", owner.clone())
}

pub fn animal(id: i64, name: &str, owner: &EntityRef) -> EntityRef {
    EntityRef::new("Animal")
        .with("id", id)
        .with("name", name)
        .with("owner", owner.clone())
}

pub fn dog(id: i64, name: &str, owner: &EntityRef, good: bool) -> EntityRef {
    EntityRef::new("Dog")
        .with("id", id)
        .with("name", name)
        .with("owner", owner.clone())
        .with("good", good)
}

pub fn note(id: i64, author: &str) -> EntityRef {
    EntityRef::new("Note").with("id", id).with("author", author)
}

pub fn report(id: i64, role: &str) -> EntityRef {
    EntityRef::new("Report").with("id", id).with("role", role)
}

fn entity_values(entities: &[EntityRef]) -> Value {
    Value::Collection(entities.iter().cloned().map(Value::Entity).collect())
}

// =============================================================================
// ASSERTION HELPERS
// =============================================================================

/// Sorted ids of entity rows.
pub fn ids(rows: &[Value]) -> Vec<i64> {
    let mut ids: Vec<i64> = rows
        .iter()
        .filter_map(|row| match row.as_entity()?.get("id")? {
            Value::Integer(id) => Some(id),
            _ => None,
        })
        .collect();
    ids.sort();
    ids
}
