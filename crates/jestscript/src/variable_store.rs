//! The variable store: scoped priority-based overload sets, per-entry history with a
//! movable cursor, and statement-/wall-clock-based lifetimes. Scopes use `IndexMap` so
//! iteration order stays deterministic for the lifetime sweep.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::trace;

use crate::ast::{LifetimeKind, Mutability, Pos};
use crate::error::{ErrorKind, JestError, JestResult};
use crate::value::Value;

/// Per-binding version history with a cursor movable by `reverse`/`forward`.
#[derive(Debug, Clone)]
pub struct History {
    values: Vec<Value>,
    index: usize,
}

impl History {
    pub(crate) fn new(initial: Value) -> Self {
        Self { values: vec![initial], index: 0 }
    }

    #[must_use]
    pub fn current(&self) -> &Value {
        &self.values[self.index]
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Assigns a new value. If it differs from the value at the cursor, the redo tail
    /// (anything past the cursor) is truncated and the new value appended; moving the
    /// cursor never does this.
    pub(crate) fn assign(&mut self, value: Value) {
        if value.same_as(self.current()) {
            self.values[self.index] = value;
            return;
        }
        self.values.truncate(self.index + 1);
        self.values.push(value);
        self.index += 1;
    }

    /// Moves the cursor back one step, saturating at the start. Returns `(value,
    /// changed)`. Does not append to history.
    pub(crate) fn go_previous(&mut self) -> (Value, bool) {
        if self.index == 0 {
            (self.current().clone(), false)
        } else {
            self.index -= 1;
            (self.current().clone(), true)
        }
    }

    /// Moves the cursor forward one step, saturating at the end.
    pub(crate) fn go_next(&mut self) -> (Value, bool) {
        if self.index + 1 >= self.values.len() {
            (self.current().clone(), false)
        } else {
            self.index += 1;
            (self.current().clone(), true)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeSpecKind {
    Infinity,
    Lines(u64),
    Seconds(u64),
}

#[derive(Debug, Clone)]
pub struct LifetimeInfo {
    pub kind: LifetimeSpecKind,
    pub declaration_index: u64,
    pub created_at: DateTime<Utc>,
}

impl LifetimeInfo {
    fn expired(&self, current_stmt_idx: u64, now: DateTime<Utc>) -> bool {
        match self.kind {
            LifetimeSpecKind::Infinity => false,
            LifetimeSpecKind::Lines(n) => current_stmt_idx.saturating_sub(self.declaration_index) >= n,
            LifetimeSpecKind::Seconds(n) => {
                let elapsed = (now - self.created_at).num_milliseconds().max(0);
                elapsed >= i64::try_from(n).unwrap_or(i64::MAX) * 1000
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub mutability: Mutability,
    pub priority: u32,
    pub declared_at_statement_index: u64,
    pub history: History,
    pub lifetime: Option<LifetimeInfo>,
}

impl Entry {
    #[must_use]
    pub fn current_value(&self) -> &Value {
        self.history.current()
    }
}

/// Ordered list of entries sharing (name, scope). The active entry is recomputed on
/// every read.
#[derive(Debug, Clone, Default)]
pub struct OverloadSet {
    entries: Vec<Entry>,
}

impl OverloadSet {
    /// Stable selection: highest priority, then highest declaration index, then list
    /// order (ties at the tail favor the later entry).
    fn active_index(&self) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let mut best = 0usize;
        for i in 1..self.entries.len() {
            let a = &self.entries[i];
            let b = &self.entries[best];
            if (a.priority, a.declared_at_statement_index) >= (b.priority, b.declared_at_statement_index) {
                best = i;
            }
        }
        Some(best)
    }

    #[must_use]
    pub fn active(&self) -> Option<&Entry> {
        self.active_index().map(|i| &self.entries[i])
    }

    fn active_mut(&mut self) -> Option<&mut Entry> {
        let idx = self.active_index()?;
        Some(&mut self.entries[idx])
    }
}

type Scope = IndexMap<String, OverloadSet>;

/// Scoped overload-set storage. Scope 0 is the global scope and can never be popped.
#[derive(Debug)]
pub struct VariableStore {
    scopes: Vec<Scope>,
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableStore {
    #[must_use]
    pub fn new() -> Self {
        Self { scopes: vec![Scope::new()] }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn pop_scope(&mut self) -> JestResult<()> {
        if self.scopes.len() <= 1 {
            return Err(JestError::new(ErrorKind::NotAssignable, "cannot pop the global scope"));
        }
        self.scopes.pop();
        Ok(())
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn declare(
        &mut self,
        name: &str,
        mutability: Mutability,
        value: Value,
        priority: u32,
        lifetime_kind: LifetimeKind,
        stmt_idx: u64,
        now: DateTime<Utc>,
    ) {
        let lifetime = match lifetime_kind {
            LifetimeKind::None => None,
            LifetimeKind::Infinity => {
                Some(LifetimeInfo { kind: LifetimeSpecKind::Infinity, declaration_index: stmt_idx, created_at: now })
            }
            LifetimeKind::Lines(n) => {
                Some(LifetimeInfo { kind: LifetimeSpecKind::Lines(n), declaration_index: stmt_idx, created_at: now })
            }
            LifetimeKind::Seconds(n) => {
                Some(LifetimeInfo { kind: LifetimeSpecKind::Seconds(n), declaration_index: stmt_idx, created_at: now })
            }
        };
        let entry = Entry {
            mutability,
            priority: priority.max(1),
            declared_at_statement_index: stmt_idx,
            history: History::new(value),
            lifetime,
        };
        let scope = self.scopes.last_mut().expect("at least global scope");
        scope.entry(name.to_owned()).or_default().entries.push(entry);
    }

    #[must_use]
    pub fn try_get(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(set) = scope.get(name) {
                if let Some(entry) = set.active() {
                    return Some(entry.current_value().clone());
                }
            }
        }
        None
    }

    pub fn assign(&mut self, name: &str, value: Value, stmt_idx: u64, pos: Pos) -> JestResult<()> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(set) = scope.get_mut(name) {
                let Some(entry) = set.active_mut() else {
                    continue;
                };
                if !entry.mutability.is_reassignable() {
                    return Err(JestError::at(
                        ErrorKind::NotAssignable,
                        format!("'{name}' is not reassignable"),
                        pos,
                    ));
                }
                entry.history.assign(value);
                entry.declared_at_statement_index = entry.declared_at_statement_index.max(stmt_idx);
                return Ok(());
            }
        }
        Err(JestError::at(ErrorKind::UndefinedVariable, format!("'{name}' is not defined"), pos))
    }

    pub fn delete(&mut self, name: &str) -> JestResult<()> {
        for scope in self.scopes.iter_mut().rev() {
            if scope.shift_remove(name).is_some() {
                return Ok(());
            }
        }
        Err(JestError::new(ErrorKind::UndefinedVariable, format!("'{name}' is not defined")))
    }

    /// Sweeps all scopes, removing expired entries and empty sets. Two-pass (collect
    /// then remove) so the sweep is safe and does not disturb unrelated names' history.
    pub fn expire_lifetimes(&mut self, current_stmt_idx: u64, now: DateTime<Utc>) {
        for scope in &mut self.scopes {
            let mut to_remove = Vec::new();
            for (name, set) in scope.iter_mut() {
                set.entries.retain(|e| !matches!(&e.lifetime, Some(l) if l.expired(current_stmt_idx, now)));
                if set.entries.is_empty() {
                    to_remove.push(name.clone());
                }
            }
            for name in to_remove {
                trace!(name, "lifetime expired, removing overload set");
                scope.shift_remove(&name);
            }
        }
    }

    pub fn try_previous(&mut self, name: &str) -> JestResult<(Value, bool)> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(set) = scope.get_mut(name) {
                if let Some(entry) = set.active_mut() {
                    return Ok(entry.history.go_previous());
                }
            }
        }
        Err(JestError::new(ErrorKind::UndefinedVariable, format!("'{name}' is not defined")))
    }

    pub fn try_next(&mut self, name: &str) -> JestResult<(Value, bool)> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(set) = scope.get_mut(name) {
                if let Some(entry) = set.active_mut() {
                    return Ok(entry.history.go_next());
                }
            }
        }
        Err(JestError::new(ErrorKind::UndefinedVariable, format!("'{name}' is not defined")))
    }

    #[must_use]
    pub fn try_get_history(&self, name: &str) -> Option<(Vec<Value>, usize)> {
        for scope in self.scopes.iter().rev() {
            if let Some(set) = scope.get(name) {
                if let Some(entry) = set.active() {
                    return Some((entry.history.values().to_vec(), entry.history.index()));
                }
            }
        }
        None
    }
}
