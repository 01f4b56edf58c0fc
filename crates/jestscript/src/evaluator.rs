//! The tree-walking evaluator: a per-statement dispatch loop with a call-frame depth
//! counter and a `Result`-flavored error channel, layered with this language's own
//! semantics -- tri-valued conditionals, postfix mutation operators, reactive `when`
//! re-evaluation after every top-level statement, and a process-wide poisoned-value
//! set for deleted literals.

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::HashSet;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument, trace_span, warn};

use crate::ast::{
    BinOp, ClassDecl, DeleteTarget, Expr, FunctionDecl, Literal, Mutability, Pattern, PostfixKind, Pos, Stmt, TriLit,
    UnaryOp, WhenDecl,
};
use crate::class_model::{ClassDefinition, ClassInstance, ClassModel, Member};
use crate::config::{Clock, InterpreterLimits};
use crate::error::{ErrorKind, JestError, JestResult};
use crate::function::FunctionDef;
use crate::value::{ArrayKey, ArrayMap, BoundMethod, Tri, Value};
use crate::variable_store::VariableStore;
use crate::when_dispatcher::WhenDispatcher;

/// Control-flow signal threaded through statement execution. Deliberately not part of
/// [`crate::error::JestError`] -- `break`/`continue`/`return` are ordinary, expected
/// outcomes of running a statement, not failures.
#[derive(Debug, Clone)]
pub enum Signal {
    None,
    Break,
    Continue,
    Return(Value),
}

impl Signal {
    fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// A value that has been `delete value`d and can no longer be assigned anywhere in the
/// process. Containers are not poisonable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoisonKey {
    Number(u64),
    Str(String),
    Bool(Tri),
    Null,
    Undefined,
}

fn poison_key(value: &Value) -> Option<PoisonKey> {
    match value {
        Value::Number(n) => Value::number_bits(*n).map(PoisonKey::Number),
        Value::String(s) => Some(PoisonKey::Str(s.to_string())),
        Value::Boolean(t) => Some(PoisonKey::Bool(*t)),
        Value::Null => Some(PoisonKey::Null),
        Value::Undefined => Some(PoisonKey::Undefined),
        Value::Array(_) | Value::Object(_) | Value::Method(_) => None,
    }
}

pub type NativeFn = fn(&mut Evaluator, &[Value]) -> JestResult<Value>;

/// Where a mutation operator (`++`, `--`, `**`) writes its result back to.
enum UpdateSite {
    Variable(String),
    ArrayElement(String, f64),
    ObjectField(Rc<RefCell<ClassInstance>>, String, Option<String>),
}

/// Owns every piece of interpreter state: scoped variables, the class registry, the
/// reactive dispatcher, user functions, the process-wide `const const const` store,
/// and the deleted-value poison set.
pub struct Evaluator {
    variables: VariableStore,
    classes: ClassModel,
    when_dispatcher: WhenDispatcher,
    functions: HashMap<String, Rc<FunctionDef>>,
    natives: HashMap<&'static str, NativeFn>,
    const_store: HashMap<String, Value>,
    poisoned: HashSet<PoisonKey>,
    clock: Box<dyn Clock>,
    limits: InterpreterLimits,
    stmt_counter: u64,
    call_depth: u32,
    rng: RefCell<StdRng>,
}

impl Evaluator {
    #[must_use]
    pub fn new(clock: Box<dyn Clock>, limits: InterpreterLimits) -> Self {
        let mut evaluator = Self {
            variables: VariableStore::new(),
            classes: ClassModel::new(),
            when_dispatcher: WhenDispatcher::new(),
            functions: HashMap::new(),
            natives: HashMap::new(),
            const_store: HashMap::new(),
            poisoned: HashSet::new(),
            clock,
            limits,
            stmt_counter: 0,
            call_depth: 0,
            rng: RefCell::new(StdRng::from_entropy()),
        };
        crate::stdlib::register_default(&mut evaluator);
        evaluator
    }

    pub fn register_native(&mut self, name: &'static str, f: NativeFn) {
        self.natives.insert(name, f);
    }

    /// Draws the next value in `[0, 1)` for the `random()` builtin.
    #[must_use]
    pub fn next_random(&self) -> f64 {
        self.rng.borrow_mut().gen()
    }

    #[must_use]
    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// Runs a full program, returning the value of a top-level `return` if one
    /// occurred (the REPL uses this to print the final expression's result).
    #[instrument(skip_all)]
    pub fn run(&mut self, program: &[Stmt]) -> JestResult<Option<Value>> {
        match self.exec_stmts(program)? {
            Signal::Return(v) => Ok(Some(v)),
            Signal::Break => Err(JestError::new(ErrorKind::InvalidBreak, "'break' used outside a loop")),
            Signal::Continue => Err(JestError::new(ErrorKind::InvalidContinue, "'continue' used outside a loop")),
            Signal::None => Ok(None),
        }
    }

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> JestResult<Signal> {
        for stmt in stmts {
            let signal = self.exec_stmt(stmt)?;
            if !signal.is_none() {
                return Ok(signal);
            }
        }
        Ok(Signal::None)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> JestResult<Signal> {
        self.stmt_counter += 1;
        let _span = trace_span!("statement", index = self.stmt_counter).entered();
        let now = self.clock.now();
        self.variables.expire_lifetimes(self.stmt_counter, now);
        let signal = self.exec_stmt_inner(stmt)?;
        self.drain_when_queue()?;
        Ok(signal)
    }

    fn exec_stmt_inner(&mut self, stmt: &Stmt) -> JestResult<Signal> {
        match stmt {
            Stmt::VarDecl { mutability, name, priority, lifetime, init, pos } => {
                let value = self.eval_expr(init)?;
                self.check_not_poisoned(&value, *pos)?;
                let now = self.clock.now();
                self.variables.declare(name, *mutability, value, *priority, *lifetime, self.stmt_counter, now);
                self.when_dispatcher.mark_dirty(name);
                Ok(Signal::None)
            }
            Stmt::ConstConstConst { name, init, pos } => {
                if self.const_store.contains_key(name) {
                    return Err(JestError::at(
                        ErrorKind::NotAssignable,
                        format!("'{name}' is a process-wide constant and cannot be redeclared"),
                        *pos,
                    ));
                }
                let value = self.eval_expr(init)?;
                self.check_not_poisoned(&value, *pos)?;
                self.const_store.insert(name.clone(), value);
                Ok(Signal::None)
            }
            Stmt::Assign { name, value, pos } => {
                if self.const_store.contains_key(name) {
                    return Err(JestError::at(
                        ErrorKind::NotAssignable,
                        format!("'{name}' is a process-wide constant"),
                        *pos,
                    ));
                }
                let v = self.eval_expr(value)?;
                self.check_not_poisoned(&v, *pos)?;
                self.variables.assign(name, v, self.stmt_counter, *pos)?;
                self.when_dispatcher.mark_dirty(name);
                Ok(Signal::None)
            }
            Stmt::If { cond, then_branch, else_branch, idk_branch, pos: _ } => {
                let cond_val = self.eval_expr(cond)?;
                match self.eval_condition(&cond_val) {
                    Tri::True => self.exec_block_scoped(then_branch),
                    Tri::Maybe => match idk_branch {
                        Some(body) => self.exec_block_scoped(body),
                        None => self.exec_block_scoped(then_branch),
                    },
                    Tri::False => match else_branch {
                        Some(body) => self.exec_block_scoped(body),
                        None => Ok(Signal::None),
                    },
                }
            }
            Stmt::While { cond, body, pos: _ } => {
                loop {
                    let cond_val = self.eval_expr(cond)?;
                    if !matches!(self.eval_condition(&cond_val), Tri::True) {
                        break;
                    }
                    match self.exec_block_scoped(body)? {
                        Signal::Break => break,
                        Signal::Continue | Signal::None => {}
                        ret @ Signal::Return(_) => return Ok(ret),
                    }
                }
                Ok(Signal::None)
            }
            Stmt::Break(_) => Ok(Signal::Break),
            Stmt::Continue(_) => Ok(Signal::Continue),
            Stmt::Return(expr, _) => {
                let value = match expr {
                    Some(e) => self.eval_expr(e)?,
                    None => Value::Undefined,
                };
                Ok(Signal::Return(value))
            }
            Stmt::When(decl, pos) => {
                self.register_when(decl, *pos)?;
                Ok(Signal::None)
            }
            Stmt::Delete(target, pos) => {
                self.exec_delete(target, *pos)?;
                Ok(Signal::None)
            }
            Stmt::Function(decl, _) => {
                self.register_function(decl);
                Ok(Signal::None)
            }
            Stmt::Class(decl, _) => {
                self.register_class(decl);
                Ok(Signal::None)
            }
            Stmt::Block(stmts, _) => self.exec_block_scoped(stmts),
            Stmt::ExpressionStatement { expr, debug_print, .. } => {
                let value = self.eval_expr(expr)?;
                if *debug_print {
                    self.print_debug(expr, &value);
                }
                Ok(Signal::None)
            }
        }
    }

    fn exec_block_scoped(&mut self, stmts: &[Stmt]) -> JestResult<Signal> {
        self.variables.push_scope();
        let result = self.exec_stmts(stmts);
        let _ = self.variables.pop_scope();
        result
    }

    fn register_function(&mut self, decl: &FunctionDecl) {
        let def = FunctionDef { name: decl.name.clone(), parameters: decl.parameters.clone(), body: decl.body.clone() };
        self.functions.insert(decl.name.clone(), Rc::new(def));
    }

    fn register_class(&mut self, decl: &ClassDecl) {
        let def = ClassDefinition::from_decl(decl);
        self.classes.register(def);
    }

    fn register_when(&mut self, decl: &WhenDecl, _pos: Pos) -> JestResult<()> {
        let id = self.when_dispatcher.register(decl.condition.clone(), decl.pattern.clone(), decl.body.clone());
        self.try_fire_subscription(id)
    }

    fn exec_delete(&mut self, target: &DeleteTarget, pos: Pos) -> JestResult<()> {
        match target {
            DeleteTarget::Binding(name) => self.variables.delete(name),
            DeleteTarget::Value(expr) => {
                let value = self.eval_expr(expr)?;
                let key = poison_key(&value)
                    .ok_or_else(|| JestError::at(ErrorKind::InvalidDeleteOperand, "this value cannot be deleted", pos))?;
                self.poisoned.insert(key);
                Ok(())
            }
        }
    }

    fn check_not_poisoned(&self, value: &Value, pos: Pos) -> JestResult<()> {
        if let Some(key) = poison_key(value) {
            if self.poisoned.contains(&key) {
                return Err(JestError::at(
                    ErrorKind::DeletedValueUsed,
                    format!("'{}' was deleted and cannot be used again", value.display_string()),
                    pos,
                ));
            }
        }
        Ok(())
    }

    /// Prints a `?`-terminated expression statement's result. An identifier that
    /// currently has a history prints its whole timeline; everything else prints
    /// `[DEBUG] <value>`.
    fn print_debug(&self, expr: &Expr, value: &Value) {
        if let Expr::Identifier(name, _) = expr {
            if let Some((values, index)) = self.variables.try_get_history(name) {
                let rendered = values.iter().map(Value::display_string).collect::<Vec<_>>().join(", ");
                println!(
                    "history({name}): [{rendered}] (current index = {index}, value = {})",
                    values[index].display_string()
                );
                return;
            }
        }
        println!("[DEBUG] {}", value.display_string());
    }

    /// Reduces any value to a tri-valued truth: only an actual `Boolean(maybe)`
    /// produces `Maybe`, everything else falls back to ordinary truthiness.
    fn eval_condition(&self, value: &Value) -> Tri {
        match value {
            Value::Boolean(t) => *t,
            other if other.is_truthy() => Tri::True,
            _ => Tri::False,
        }
    }

    /// Drains the reactive dispatch queue to a fixed point. Non-reentrant: a clause
    /// fired from inside this loop that triggers further mutations only enqueues more
    /// work, it never recurses into a nested drain.
    fn drain_when_queue(&mut self) -> JestResult<()> {
        if self.when_dispatcher.is_dispatching() {
            return Ok(());
        }
        self.when_dispatcher.begin_dispatch();
        let mut iterations: u64 = 0;
        let mut outcome = Ok(());
        while let Some(id) = self.when_dispatcher.dequeue() {
            iterations += 1;
            if iterations > self.limits.max_dispatch_iterations {
                warn!(iterations, "when-dispatch safety ceiling tripped");
                outcome = Err(JestError::new(ErrorKind::InfiniteWhenLoop, "when-dispatch did not reach a fixed point"));
                break;
            }
            if let Err(e) = self.try_fire_subscription(id) {
                outcome = Err(e);
                break;
            }
        }
        self.when_dispatcher.end_dispatch();
        outcome
    }

    fn try_fire_subscription(&mut self, id: usize) -> JestResult<()> {
        let (condition, pattern, body) = {
            let sub = self.when_dispatcher.subscription(id);
            (sub.condition.clone(), sub.pattern.clone(), sub.body.clone())
        };
        match pattern {
            None => {
                let cond_val = self.eval_expr(&condition)?;
                if matches!(self.eval_condition(&cond_val), Tri::True) {
                    debug!(id, "when clause fired");
                    self.exec_block_scoped(&body)?;
                }
            }
            Some((target_expr, pat, guard)) => {
                let target_val = self.eval_expr(&target_expr)?;
                self.variables.push_scope();
                let bound = self.try_bind_pattern(&pat, &target_val)?;
                let mut fires = bound;
                if fires {
                    if let Some(g) = &guard {
                        let gv = self.eval_expr(g)?;
                        fires = matches!(self.eval_condition(&gv), Tri::True);
                    }
                }
                if fires {
                    debug!(id, "when-matches clause fired");
                    self.exec_stmts(&body)?;
                }
                let _ = self.variables.pop_scope();
            }
        }
        Ok(())
    }

    fn try_bind_pattern(&mut self, pattern: &Pattern, value: &Value) -> JestResult<bool> {
        match pattern {
            Pattern::Binding { name, default } => {
                let bound_value = if matches!(value, Value::Undefined) {
                    match default {
                        Some(d) => self.eval_expr(d)?,
                        None => value.clone(),
                    }
                } else {
                    value.clone()
                };
                let now = self.clock.now();
                self.variables.declare(
                    name,
                    Mutability::VarVar,
                    bound_value,
                    1,
                    crate::ast::LifetimeKind::None,
                    self.stmt_counter,
                    now,
                );
                Ok(true)
            }
            Pattern::Array { elements, rest } => {
                let Value::Array(map) = value else { return Ok(false) };
                for (i, el) in elements.iter().enumerate() {
                    let key = ArrayKey((i + 1) as f64);
                    let element_value = map.get(&key).cloned().unwrap_or(Value::Undefined);
                    if !self.try_bind_pattern(el, &element_value)? {
                        return Ok(false);
                    }
                }
                if let Some(rest_name) = rest {
                    let mut rest_map = ArrayMap::new();
                    for (k, v) in map.iter() {
                        if k.0 as usize > elements.len() {
                            rest_map.insert(*k, v.clone());
                        }
                    }
                    let now = self.clock.now();
                    self.variables.declare(
                        rest_name,
                        Mutability::VarVar,
                        Value::Array(Rc::new(rest_map)),
                        1,
                        crate::ast::LifetimeKind::None,
                        self.stmt_counter,
                        now,
                    );
                }
                Ok(true)
            }
            Pattern::Object { fields } => {
                let Value::Object(inst) = value else { return Ok(false) };
                for field in fields {
                    let current = inst.borrow().get_field(&field.key).cloned().unwrap_or(Value::Undefined);
                    let resolved = if matches!(current, Value::Undefined) {
                        match &field.default {
                            Some(d) => self.eval_expr(d)?,
                            None => current,
                        }
                    } else {
                        current
                    };
                    if !self.try_bind_pattern(&field.pattern, &resolved)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    fn eval_expr(&mut self, expr: &Expr) -> JestResult<Value> {
        match expr {
            Expr::Literal(lit, pos) => self.eval_literal(lit, *pos),
            Expr::Identifier(name, pos) => self.eval_identifier(name, *pos),
            Expr::ArrayLiteral(items, _) => {
                let mut entries = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    entries.push(((i + 1) as f64, self.eval_expr(item)?));
                }
                Ok(Value::array_from(entries))
            }
            Expr::Binary { op, left, right, pos } => self.eval_binary(*op, left, right, *pos),
            Expr::Unary { op, expr, pos } => self.eval_unary(*op, expr, *pos),
            Expr::Conditional { cond, then_branch, else_branch, maybe_branch, undefined_branch, .. } => {
                self.eval_conditional(cond, then_branch, else_branch, maybe_branch.as_deref(), undefined_branch.as_deref())
            }
            Expr::Call { callee, args, pos } => self.eval_call(callee, args, *pos),
            Expr::Index { target, index, pos } => self.eval_index(target, index, *pos),
            Expr::IndexAssign { target, index, value, pos } => self.eval_index_assign(target, index, value, *pos),
            Expr::PostfixUpdate { target, kind, delta, pos } => self.eval_postfix_update(target, *kind, *delta, *pos),
            Expr::PowerStars { target, delta, pos } => self.eval_power_stars(target, *delta, *pos),
            Expr::PrefixRoot { expr, pos } => {
                let n = self.eval_expr(expr)?.to_number().map_err(|_| self.not_a_number(*pos))?;
                Ok(nth_root(n, 2.0))
            }
            Expr::RootInfix { base, degree, pos } => {
                let b = self.eval_expr(base)?.to_number().map_err(|_| self.not_a_number(*pos))?;
                let d = self.eval_expr(degree)?.to_number().map_err(|_| self.not_a_number(*pos))?;
                if d == 0.0 {
                    Ok(Value::Undefined)
                } else {
                    Ok(nth_root(b, d))
                }
            }
        }
    }

    fn not_a_number(&self, pos: Pos) -> JestError {
        JestError::at(ErrorKind::NotANumber, "value cannot be coerced to a number", pos)
    }

    fn eval_literal(&self, lit: &Literal, pos: Pos) -> JestResult<Value> {
        let value = match lit {
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::string(s.clone()),
            Literal::Boolean(TriLit::False) => Value::Boolean(Tri::False),
            Literal::Boolean(TriLit::True) => Value::Boolean(Tri::True),
            Literal::Boolean(TriLit::Maybe) => Value::Boolean(Tri::Maybe),
            Literal::Null => Value::Null,
            Literal::Undefined => Value::Undefined,
        };
        self.check_not_poisoned(&value, pos)?;
        Ok(value)
    }

    fn eval_identifier(&mut self, name: &str, pos: Pos) -> JestResult<Value> {
        if let Some(v) = self.const_store.get(name) {
            return Ok(v.clone());
        }
        if let Some(v) = self.variables.try_get(name) {
            return Ok(v);
        }
        if self.classes.definition(name).is_some() {
            let inst = self.classes.instance(name)?;
            return Ok(Value::Object(inst));
        }
        Err(JestError::at(ErrorKind::UndefinedVariable, format!("'{name}' is not defined"), pos))
    }

    fn eval_binary(&mut self, op: BinOp, left: &Expr, right: &Expr, pos: Pos) -> JestResult<Value> {
        let lv = self.eval_expr(left)?;
        let rv = self.eval_expr(right)?;
        match op {
            BinOp::Add => {
                if matches!(lv, Value::String(_)) || matches!(rv, Value::String(_)) {
                    Ok(Value::string(format!("{}{}", lv.display_string(), rv.display_string())))
                } else {
                    let a = lv.to_number().map_err(|_| self.not_a_number(pos))?;
                    let b = rv.to_number().map_err(|_| self.not_a_number(pos))?;
                    Ok(Value::Number(a + b))
                }
            }
            BinOp::Sub | BinOp::Mul | BinOp::Div => {
                let a = lv.to_number().map_err(|_| self.not_a_number(pos))?;
                let b = rv.to_number().map_err(|_| self.not_a_number(pos))?;
                Ok(Value::Number(match op {
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    _ => unreachable!(),
                }))
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = if let (Value::String(a), Value::String(b)) = (&lv, &rv) {
                    a.as_ref().cmp(b.as_ref())
                } else {
                    let a = lv.to_number().map_err(|_| self.not_a_number(pos))?;
                    let b = rv.to_number().map_err(|_| self.not_a_number(pos))?;
                    a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
                };
                let result = match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    BinOp::Ge => ordering.is_ge(),
                    _ => unreachable!(),
                };
                Ok(Value::Boolean(tri_from(result)))
            }
            BinOp::EqLoose => Ok(Value::Boolean(tri_from(lv.loose_eq(&rv)))),
            BinOp::EqStrict => Ok(Value::Boolean(tri_from(lv.strict_eq(&rv)))),
            BinOp::EqVeryStrict => Ok(Value::Boolean(tri_from(lv.very_strict_eq(&rv)))),
            BinOp::EqVeryLoose => Ok(Value::Boolean(tri_from(lv.very_loose_eq(&rv)))),
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, expr: &Expr, pos: Pos) -> JestResult<Value> {
        let v = self.eval_expr(expr)?;
        match op {
            UnaryOp::Neg => {
                let n = v.to_number().map_err(|_| self.not_a_number(pos))?;
                Ok(Value::Number(-n))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_conditional(
        &mut self,
        cond: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
        maybe_branch: Option<&Expr>,
        undefined_branch: Option<&Expr>,
    ) -> JestResult<Value> {
        let cond_val = self.eval_expr(cond)?;
        if matches!(cond_val, Value::Undefined) {
            if let Some(b) = undefined_branch {
                return self.eval_expr(b);
            }
        }
        match self.eval_condition(&cond_val) {
            Tri::True => self.eval_expr(then_branch),
            Tri::Maybe => match maybe_branch {
                Some(b) => self.eval_expr(b),
                None => self.eval_expr(then_branch),
            },
            Tri::False => self.eval_expr(else_branch),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], pos: Pos) -> JestResult<Value> {
        if let Expr::Identifier(name, _) = callee {
            match name.as_str() {
                "reverse" | "forward" => {
                    if let [Expr::Identifier(var_name, _)] = args {
                        let (value, _changed) = if name == "reverse" {
                            self.variables.try_previous(var_name)?
                        } else {
                            self.variables.try_next(var_name)?
                        };
                        self.when_dispatcher.mark_dirty(var_name);
                        return Ok(value);
                    }
                }
                _ => {}
            }
            if let Some(f) = self.functions.get(name).cloned() {
                let arg_values = self.eval_args(args)?;
                return self.call_function(&f, arg_values, None, pos);
            }
            if let Some(native) = self.natives.get(name.as_str()).copied() {
                let arg_values = self.eval_args(args)?;
                return native(self, &arg_values);
            }
            if self.classes.definition(name).is_some() {
                let arg_values = self.eval_args(args)?;
                return self.instantiate_class(name, arg_values, pos);
            }
            return Err(JestError::at(ErrorKind::UnknownFunction, format!("'{name}' is not defined"), pos));
        }
        let callee_val = self.eval_expr(callee)?;
        let arg_values = self.eval_args(args)?;
        match callee_val {
            Value::Method(m) => self.call_function(&m.function, arg_values, Some(Rc::clone(&m.target)), pos),
            _ => Err(JestError::at(ErrorKind::NotCallable, "value is not callable", pos)),
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> JestResult<Vec<Value>> {
        args.iter().map(|a| self.eval_expr(a)).collect()
    }

    fn call_function(
        &mut self,
        f: &FunctionDef,
        args: Vec<Value>,
        this: Option<Rc<RefCell<ClassInstance>>>,
        pos: Pos,
    ) -> JestResult<Value> {
        if self.call_depth >= self.limits.max_call_depth {
            return Err(JestError::at(ErrorKind::RecursionLimit, "call depth limit exceeded", pos));
        }
        self.call_depth += 1;
        self.variables.push_scope();
        let now = self.clock.now();
        for (i, param) in f.parameters.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or(Value::Undefined);
            self.variables.declare(param, Mutability::VarVar, value, 1, crate::ast::LifetimeKind::None, self.stmt_counter, now);
        }
        if let Some(target) = this {
            self.variables.declare(
                "source",
                Mutability::ConstConst,
                Value::Object(target),
                1,
                crate::ast::LifetimeKind::None,
                self.stmt_counter,
                now,
            );
        }
        let result = self.exec_stmts(&f.body);
        let _ = self.variables.pop_scope();
        self.call_depth -= 1;
        match result? {
            Signal::Return(v) => Ok(v),
            Signal::Break => Err(JestError::at(ErrorKind::InvalidBreak, "'break' used outside a loop", pos)),
            Signal::Continue => Err(JestError::at(ErrorKind::InvalidContinue, "'continue' used outside a loop", pos)),
            Signal::None => Ok(Value::Undefined),
        }
    }

    fn instantiate_class(&mut self, name: &str, args: Vec<Value>, pos: Pos) -> JestResult<Value> {
        let def = Rc::clone(self.classes.definition(name).expect("checked by caller"));
        let inst = self.classes.instance(name)?;
        if !inst.borrow().initialized {
            for (field, init) in &def.static_property_initializers {
                let value = self.eval_expr(init)?;
                self.classes.set_static_field(name, field, value);
            }
            for field in &def.static_property_names {
                if self.classes.static_field(name, field).is_none() {
                    self.classes.set_static_field(name, field, Value::Undefined);
                }
            }
            for (field, init) in &def.property_initializers {
                let value = self.eval_expr(init)?;
                inst.borrow_mut().set_field(field, value);
            }
            for field in &def.property_names {
                if inst.borrow().get_field(field).is_none() {
                    inst.borrow_mut().set_field(field, Value::Undefined);
                }
            }
            inst.borrow_mut().initialized = true;
            if let Some(ctor) = def.instance_methods.get("constructor").cloned() {
                self.call_function(&ctor, args, Some(Rc::clone(&inst)), pos)?;
            }
        }
        Ok(Value::Object(inst))
    }

    fn eval_index(&mut self, target: &Expr, index: &Expr, pos: Pos) -> JestResult<Value> {
        let base = self.eval_expr(target)?;
        match base {
            Value::Array(map) => {
                let k = self.eval_expr(index)?.to_number().map_err(|_| self.not_a_number(pos))?;
                Ok(map.get(&ArrayKey(k)).cloned().unwrap_or(Value::Undefined))
            }
            Value::Object(inst) => {
                let field = self.eval_expr(index)?.display_string();
                let class_name = inst.borrow().class_name.clone();
                match self.classes.resolve_member(&class_name, &field, &inst) {
                    Some(Member::Value(v)) => Ok(v),
                    Some(Member::Method(f)) => {
                        Ok(Value::Method(Rc::new(BoundMethod { target: Rc::clone(&inst), method_name: field, function: f })))
                    }
                    None => Ok(Value::Undefined),
                }
            }
            _ => Err(JestError::at(ErrorKind::NotIndexable, "value is not indexable", pos)),
        }
    }

    fn eval_index_assign(&mut self, target: &Expr, index: &Expr, value: &Expr, pos: Pos) -> JestResult<Value> {
        let Expr::Identifier(name, _) = target else {
            return Err(JestError::at(ErrorKind::ArgumentBaseNotIdentifier, "assignment target must be a name", pos));
        };
        let base = self.eval_identifier(name, pos)?;
        let new_value = self.eval_expr(value)?;
        self.check_not_poisoned(&new_value, pos)?;
        match base {
            Value::Array(map) => {
                let k = self.eval_expr(index)?.to_number().map_err(|_| self.not_a_number(pos))?;
                let mut rebuilt = (*map).clone();
                rebuilt.insert(ArrayKey(k), new_value.clone());
                self.variables.assign(name, Value::Array(Rc::new(rebuilt)), self.stmt_counter, pos)?;
            }
            Value::Object(inst) => {
                let field = self.eval_expr(index)?.display_string();
                let class_name = inst.borrow().class_name.clone();
                if self.classes.is_static_field(&class_name, &field) {
                    self.classes.set_static_field(&class_name, &field, new_value.clone());
                } else {
                    inst.borrow_mut().set_field(&field, new_value.clone());
                }
                self.when_dispatcher.mark_dirty(&class_name);
            }
            _ => return Err(JestError::at(ErrorKind::NotIndexable, "value is not indexable", pos)),
        }
        self.when_dispatcher.mark_dirty(name);
        Ok(new_value)
    }

    fn resolve_update_site(&mut self, expr: &Expr, pos: Pos) -> JestResult<(UpdateSite, Value)> {
        match expr {
            Expr::Identifier(name, _) => {
                let v = self
                    .variables
                    .try_get(name)
                    .ok_or_else(|| JestError::at(ErrorKind::UndefinedVariable, format!("'{name}' is not defined"), pos))?;
                Ok((UpdateSite::Variable(name.clone()), v))
            }
            Expr::Index { target, index, .. } => {
                let base = self.eval_expr(target)?;
                match base {
                    Value::Array(map) => {
                        let Expr::Identifier(name, _) = target.as_ref() else {
                            return Err(JestError::at(
                                ErrorKind::ArgumentBaseNotIdentifier,
                                "update target must be a name",
                                pos,
                            ));
                        };
                        let k = self.eval_expr(index)?.to_number().map_err(|_| self.not_a_number(pos))?;
                        let current = map.get(&ArrayKey(k)).cloned().unwrap_or(Value::Undefined);
                        Ok((UpdateSite::ArrayElement(name.clone(), k), current))
                    }
                    Value::Object(inst) => {
                        let field = self.eval_expr(index)?.display_string();
                        let class_name = inst.borrow().class_name.clone();
                        let current = if self.classes.is_static_field(&class_name, &field) {
                            self.classes.static_field(&class_name, &field).cloned().unwrap_or(Value::Undefined)
                        } else {
                            inst.borrow().get_field(&field).cloned().unwrap_or(Value::Undefined)
                        };
                        let alias = if let Expr::Identifier(name, _) = target.as_ref() { Some(name.clone()) } else { None };
                        Ok((UpdateSite::ObjectField(inst, field, alias), current))
                    }
                    _ => Err(JestError::at(ErrorKind::NotIndexable, "value is not indexable", pos)),
                }
            }
            _ => Err(JestError::at(ErrorKind::ArgumentBaseNotIdentifier, "update target must be a name or index", pos)),
        }
    }

    fn write_update_site(&mut self, site: UpdateSite, value: Value, pos: Pos) -> JestResult<()> {
        match site {
            UpdateSite::Variable(name) => {
                self.variables.assign(&name, value, self.stmt_counter, pos)?;
                self.when_dispatcher.mark_dirty(&name);
            }
            UpdateSite::ArrayElement(name, key) => {
                let Some(Value::Array(map)) = self.variables.try_get(&name) else {
                    return Err(JestError::at(ErrorKind::NotIndexable, "value is not indexable", pos));
                };
                let mut rebuilt = (*map).clone();
                rebuilt.insert(ArrayKey(key), value);
                self.variables.assign(&name, Value::Array(Rc::new(rebuilt)), self.stmt_counter, pos)?;
                self.when_dispatcher.mark_dirty(&name);
            }
            UpdateSite::ObjectField(inst, field, alias) => {
                let class_name = inst.borrow().class_name.clone();
                if self.classes.is_static_field(&class_name, &field) {
                    self.classes.set_static_field(&class_name, &field, value);
                } else {
                    inst.borrow_mut().set_field(&field, value);
                }
                self.when_dispatcher.mark_dirty(&class_name);
                if let Some(alias) = alias {
                    self.when_dispatcher.mark_dirty(&alias);
                }
            }
        }
        Ok(())
    }

    /// `x++`, `x++++`, `x--`: the run of consecutive operator characters sets `delta`
    /// (delta = run length minus one, so `x++++` has delta 3). Writes the updated
    /// value but evaluates to the value the binding held beforehand.
    fn eval_postfix_update(&mut self, target: &Expr, kind: PostfixKind, delta: u32, pos: Pos) -> JestResult<Value> {
        let (site, current) = self.resolve_update_site(target, pos)?;
        let n = current.to_number().map_err(|_| self.not_a_number(pos))?;
        let updated = match kind {
            PostfixKind::Inc => n + f64::from(delta),
            PostfixKind::Dec => n - f64::from(delta),
        };
        self.write_update_site(site, Value::Number(updated), pos)?;
        Ok(Value::Number(n))
    }

    /// `x**`, `x****`: raises the target to the power of `delta` (the run length
    /// itself, per the scenario `a[2]**` on `20` yielding `400`). Evaluates to the
    /// pre-update value, like the other postfix mutation operators. A non-finite
    /// result (overflow) is stored as `Undefined` rather than `inf`/`NaN`.
    fn eval_power_stars(&mut self, target: &Expr, delta: u32, pos: Pos) -> JestResult<Value> {
        let (site, current) = self.resolve_update_site(target, pos)?;
        let n = current.to_number().map_err(|_| self.not_a_number(pos))?;
        let raised = n.powi(delta as i32);
        let new_value = if raised.is_finite() { Value::Number(raised) } else { Value::Undefined };
        self.write_update_site(site, new_value, pos)?;
        Ok(Value::Number(n))
    }
}

fn tri_from(b: bool) -> Tri {
    if b { Tri::True } else { Tri::False }
}

/// `base` to the `1/degree` power, preserving sign for odd integer roots of a
/// negative base (so a cube root of -8 is -2, not `NaN`) and collapsing every
/// non-finite result to `Undefined`.
fn nth_root(base: f64, degree: f64) -> Value {
    let result = if base < 0.0 {
        let degree_int = degree as i64;
        if (degree_int as f64) == degree && degree_int % 2 != 0 {
            -(-base).powf(1.0 / degree)
        } else {
            f64::NAN
        }
    } else {
        base.powf(1.0 / degree)
    };
    if result.is_finite() { Value::Number(result) } else { Value::Undefined }
}
