//! Access checks within one unit of work.
//!
//! An [`AccessManager`] belongs to a single unit of work and thread. Loaded
//! entities are handed out as [`SecureEntity`] wrappers that check READ
//! access before their state is exposed and UPDATE access when staged
//! writes are flushed.

use indexmap::IndexMap;
use rowgate_core::{AccessType, EntityRef, SecurityContext, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;

use crate::entity_filter::EntityFilter;
use crate::error::FilterError;

/// When a [`SecureEntity`] checks READ access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyStrategy {
    /// On creation of the wrapper.
    #[default]
    Eager,
    /// On the first read through the wrapper.
    Lazy,
}

/// Per unit-of-work access checking.
///
/// Checks can be disabled (for trusted internal work) or delayed until the
/// end of a batch. Re-entrancy is guarded by the evaluation parameters of
/// the running check, see [`EntityFilter::is_accessible_with`].
pub struct AccessManager {
    filter: Arc<EntityFilter>,
    context: Arc<dyn SecurityContext>,
    disabled: Cell<usize>,
    delayed: Cell<usize>,
    pending: RefCell<Vec<(AccessType, EntityRef)>>,
}

impl fmt::Debug for AccessManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessManager")
            .field("disabled", &self.disabled.get())
            .field("delayed", &self.delayed.get())
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}

impl AccessManager {
    pub fn new(filter: Arc<EntityFilter>, context: Arc<dyn SecurityContext>) -> Self {
        Self {
            filter,
            context,
            disabled: Cell::new(0),
            delayed: Cell::new(0),
            pending: RefCell::new(Vec::new()),
        }
    }

    pub fn filter(&self) -> &Arc<EntityFilter> {
        &self.filter
    }

    pub fn context(&self) -> &Arc<dyn SecurityContext> {
        &self.context
    }

    pub fn checks_enabled(&self) -> bool {
        self.disabled.get() == 0
    }

    /// Skip all checks until the guard is dropped.
    pub fn disable_checks(&self) -> ChecksDisabled<'_> {
        self.disabled.set(self.disabled.get() + 1);
        ChecksDisabled { manager: self }
    }

    /// Collect checks until [`DelayedChecks::finish`] runs them.
    pub fn delay_checks(&self) -> DelayedChecks<'_> {
        self.delayed.set(self.delayed.get() + 1);
        DelayedChecks {
            manager: self,
            finished: false,
        }
    }

    pub fn pending_checks(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_accessible(
        &self,
        access_type: AccessType,
        entity: &EntityRef,
    ) -> Result<bool, FilterError> {
        if !self.checks_enabled() {
            return Ok(true);
        }
        self.filter
            .is_accessible(access_type, entity, self.context.as_ref())
    }

    /// Deny with [`FilterError::AccessDenied`], or record the check when
    /// checks are delayed.
    pub fn check_access(&self, access_type: AccessType, entity: &EntityRef) -> Result<(), FilterError> {
        if !self.checks_enabled() {
            return Ok(());
        }
        if self.delayed.get() > 0 {
            self.pending.borrow_mut().push((access_type, entity.clone()));
            return Ok(());
        }
        if self.is_accessible(access_type, entity)? {
            Ok(())
        } else {
            tracing::debug!(
                entity = %entity.entity_name(),
                access_type = %access_type,
                "access denied"
            );
            Err(FilterError::AccessDenied {
                entity: entity.entity_name().to_string(),
                access_type,
            })
        }
    }

    /// Wrap a loaded entity.
    pub fn secure(
        &self,
        entity: EntityRef,
        strategy: ProxyStrategy,
    ) -> Result<SecureEntity<'_>, FilterError> {
        let secure = SecureEntity {
            manager: self,
            entity,
            strategy,
            read_checked: Cell::new(false),
            staged: RefCell::new(IndexMap::new()),
        };
        if strategy == ProxyStrategy::Eager {
            secure.ensure_readable()?;
        }
        Ok(secure)
    }

    fn run_pending(&self) -> Result<(), FilterError> {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        let mut checked: Vec<(AccessType, &EntityRef)> = Vec::with_capacity(pending.len());
        for (access_type, entity) in &pending {
            if checked
                .iter()
                .any(|(t, e)| t == access_type && e.same_instance(entity))
            {
                continue;
            }
            checked.push((*access_type, entity));
            self.check_access(*access_type, entity)?;
        }
        Ok(())
    }
}

/// Guard returned by [`AccessManager::disable_checks`].
#[must_use]
pub struct ChecksDisabled<'a> {
    manager: &'a AccessManager,
}

impl Drop for ChecksDisabled<'_> {
    fn drop(&mut self) {
        self.manager.disabled.set(self.manager.disabled.get() - 1);
    }
}

/// Guard returned by [`AccessManager::delay_checks`].
#[must_use]
pub struct DelayedChecks<'a> {
    manager: &'a AccessManager,
    finished: bool,
}

impl DelayedChecks<'_> {
    /// End the delay; the outermost guard runs the collected checks.
    pub fn finish(mut self) -> Result<(), FilterError> {
        self.finished = true;
        let manager = self.manager;
        manager.delayed.set(manager.delayed.get() - 1);
        if manager.delayed.get() == 0 {
            manager.run_pending()
        } else {
            Ok(())
        }
    }
}

impl Drop for DelayedChecks<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let manager = self.manager;
        manager.delayed.set(manager.delayed.get() - 1);
        if manager.delayed.get() == 0 {
            let discarded = std::mem::take(&mut *manager.pending.borrow_mut()).len();
            if discarded > 0 {
                tracing::warn!(discarded, "delayed access checks dropped without running");
            }
        }
    }
}

/// A loaded entity whose reads and writes go through access checks.
pub struct SecureEntity<'m> {
    manager: &'m AccessManager,
    entity: EntityRef,
    strategy: ProxyStrategy,
    read_checked: Cell<bool>,
    staged: RefCell<IndexMap<String, Value>>,
}

impl fmt::Debug for SecureEntity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureEntity")
            .field("entity", &self.entity.entity_name())
            .field("strategy", &self.strategy)
            .field("read_checked", &self.read_checked.get())
            .field("staged", &self.staged.borrow().len())
            .finish()
    }
}

impl SecureEntity<'_> {
    pub fn entity_name(&self) -> &str {
        self.entity.entity_name()
    }

    pub fn strategy(&self) -> ProxyStrategy {
        self.strategy
    }

    /// The wrapped entity, once READ access is granted.
    pub fn entity(&self) -> Result<&EntityRef, FilterError> {
        self.ensure_readable()?;
        Ok(&self.entity)
    }

    /// A property value; staged writes are visible before they are flushed.
    pub fn get(&self, property: &str) -> Result<Value, FilterError> {
        self.ensure_readable()?;
        if let Some(value) = self.staged.borrow().get(property) {
            return Ok(value.clone());
        }
        let mapping = self.manager.filter.rules().mapping();
        let value = match mapping
            .class_mapping_for_entity(&self.entity)
            .and_then(|class| class.property(property))
        {
            Some(mapping) => mapping.get_value(&self.entity),
            None => self.entity.get(property).unwrap_or(Value::Null),
        };
        Ok(value)
    }

    /// Stage a write; it reaches the entity on [`flush`](Self::flush).
    pub fn set(&self, property: impl Into<String>, value: impl Into<Value>) {
        self.staged.borrow_mut().insert(property.into(), value.into());
    }

    pub fn is_dirty(&self) -> bool {
        !self.staged.borrow().is_empty()
    }

    pub fn discard(&self) {
        self.staged.borrow_mut().clear();
    }

    /// Apply staged writes and check UPDATE access on the new state. On
    /// denial the previous state is restored.
    pub fn flush(&self) -> Result<(), FilterError> {
        let staged = std::mem::take(&mut *self.staged.borrow_mut());
        if staged.is_empty() {
            return Ok(());
        }
        let snapshot = self.entity.snapshot();
        let mapping = self.manager.filter.rules().mapping();
        let class = mapping.class_mapping_for_entity(&self.entity);
        for (property, value) in staged {
            match class.and_then(|class| class.property(&property)) {
                Some(mapping) => mapping.set_value(&self.entity, value),
                None => self.entity.set(property, value),
            }
        }
        match self.manager.check_access(AccessType::Update, &self.entity) {
            Ok(()) => Ok(()),
            Err(error) => {
                self.entity.restore(snapshot);
                Err(error)
            }
        }
    }

    fn ensure_readable(&self) -> Result<(), FilterError> {
        if self.read_checked.get() {
            return Ok(());
        }
        self.manager.check_access(AccessType::Read, &self.entity)?;
        self.read_checked.set(true);
        Ok(())
    }
}
