//! The reactive dispatcher: a FIFO of pending `when` clauses drained to a fixed
//! point, guarded by an iteration ceiling so a pathological feedback loop fails
//! loudly rather than hanging the process.

use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::ast::{Expr, Pattern};

fn collect_pattern_names(pattern: &Pattern, out: &mut HashSet<String>) {
    match pattern {
        Pattern::Binding { default, .. } => {
            if let Some(expr) = default {
                collect_identifiers(expr, out);
            }
        }
        Pattern::Array { elements, .. } => {
            for el in elements {
                collect_pattern_names(el, out);
            }
        }
        Pattern::Object { fields } => {
            for field in fields {
                collect_pattern_names(&field.pattern, out);
                if let Some(expr) = &field.default {
                    collect_identifiers(expr, out);
                }
            }
        }
    }
}

/// Walks an expression tree collecting every identifier it reads, used to index a
/// subscription by the names it depends on: a clause re-evaluates whenever one of the
/// identifiers referenced by its condition is reassigned. A call's callee identifier is
/// not itself a dependency (only its arguments are), since calling the same function
/// doesn't mean the function's name changed.
pub fn collect_identifiers(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::Literal(..) => {}
        Expr::Identifier(name, _) => {
            out.insert(name.clone());
        }
        Expr::ArrayLiteral(items, _) => {
            for item in items {
                collect_identifiers(item, out);
            }
        }
        Expr::Binary { left, right, .. } => {
            collect_identifiers(left, out);
            collect_identifiers(right, out);
        }
        Expr::Unary { expr, .. } | Expr::PrefixRoot { expr, .. } => collect_identifiers(expr, out),
        Expr::Conditional { cond, then_branch, else_branch, maybe_branch, undefined_branch, .. } => {
            collect_identifiers(cond, out);
            collect_identifiers(then_branch, out);
            collect_identifiers(else_branch, out);
            if let Some(e) = maybe_branch {
                collect_identifiers(e, out);
            }
            if let Some(e) = undefined_branch {
                collect_identifiers(e, out);
            }
        }
        Expr::Call { callee, args, .. } => {
            if !matches!(callee.as_ref(), Expr::Identifier(..)) {
                collect_identifiers(callee, out);
            }
            for arg in args {
                collect_identifiers(arg, out);
            }
        }
        Expr::Index { target, index, .. } => {
            collect_identifiers(target, out);
            collect_identifiers(index, out);
        }
        Expr::IndexAssign { target, index, value, .. } => {
            collect_identifiers(target, out);
            collect_identifiers(index, out);
            collect_identifiers(value, out);
        }
        Expr::PostfixUpdate { target, .. } | Expr::PowerStars { target, .. } => collect_identifiers(target, out),
        Expr::RootInfix { base, degree, .. } => {
            collect_identifiers(base, out);
            collect_identifiers(degree, out);
        }
    }
}

/// A registered `when` clause. `pattern` mirrors the `when x matches <pattern>` form;
/// plain `when <cond>` clauses leave it `None`.
pub struct Subscription {
    pub id: usize,
    pub condition: Expr,
    pub pattern: Option<(Expr, Pattern, Option<Expr>)>,
    pub body: Vec<crate::ast::Stmt>,
    pub dependencies: HashSet<String>,
}

/// Key a dependency-free subscription is registered and dispatched under: a clause
/// whose condition names no identifier (or whose only identifier is an excluded call
/// callee) would otherwise never be reachable from any mutation.
const WILDCARD_KEY: &str = "*";

/// Dependency-indexed registry plus a non-reentrant dispatch queue. While the queue is
/// being drained, mutations triggered by running a clause's body enqueue rather than
/// recursively dispatch, so the order clauses fire in is always FIFO.
#[derive(Default)]
pub struct WhenDispatcher {
    subscriptions: Vec<Subscription>,
    dependency_index: std::collections::HashMap<String, Vec<usize>>,
    queue: VecDeque<usize>,
    queued: HashSet<usize>,
    dispatching: bool,
}

/// Safety ceiling on total dispatch iterations per top-level statement, for a
/// mutation cycle that never settles.
pub const MAX_DISPATCH_ITERATIONS: u64 = 100_000;

impl WhenDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, condition: Expr, pattern: Option<(Expr, Pattern, Option<Expr>)>, body: Vec<crate::ast::Stmt>) -> usize {
        let mut deps = HashSet::new();
        collect_identifiers(&condition, &mut deps);
        if let Some((target, pat, guard)) = &pattern {
            collect_identifiers(target, &mut deps);
            collect_pattern_names(pat, &mut deps);
            if let Some(guard) = guard {
                collect_identifiers(guard, &mut deps);
            }
        }
        if deps.is_empty() {
            deps.insert(WILDCARD_KEY.to_owned());
        }
        let id = self.subscriptions.len();
        for name in &deps {
            self.dependency_index.entry(name.clone()).or_default().push(id);
        }
        self.subscriptions.push(Subscription { id, condition, pattern, body, dependencies: deps });
        id
    }

    #[must_use]
    pub fn subscription(&self, id: usize) -> &Subscription {
        &self.subscriptions[id]
    }

    #[must_use]
    pub fn is_dispatching(&self) -> bool {
        self.dispatching
    }

    /// Called after every successful mutation of `name`. Enqueues every clause that
    /// depends on it, plus every wildcard (dependency-free) clause, skipping duplicates
    /// already pending. The union is sorted by subscription id so a single mutation
    /// enqueues its dependents in registration order regardless of which group (named
    /// or wildcard) they came from.
    pub fn mark_dirty(&mut self, name: &str) {
        let mut ids = BTreeSet::new();
        if let Some(group) = self.dependency_index.get(name) {
            ids.extend(group.iter().copied());
        }
        if name != WILDCARD_KEY {
            if let Some(group) = self.dependency_index.get(WILDCARD_KEY) {
                ids.extend(group.iter().copied());
            }
        }
        for id in ids {
            if self.queued.insert(id) {
                self.queue.push_back(id);
            }
        }
    }

    pub fn begin_dispatch(&mut self) {
        self.dispatching = true;
    }

    pub fn end_dispatch(&mut self) {
        self.dispatching = false;
    }

    pub fn dequeue(&mut self) -> Option<usize> {
        let id = self.queue.pop_front()?;
        self.queued.remove(&id);
        Some(id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
