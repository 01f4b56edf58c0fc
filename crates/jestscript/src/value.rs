//! The runtime value model: an 8-kind tagged value, tri-valued booleans, and the
//! four-tier equality ladder the language exposes as `==`/`===`/`====`/`><`.
//! Containers share ownership via `Rc` rather than a manual reference-counted heap
//! arena; nothing here needs cycle collection beyond what a reference-counted tree
//! already gives for free.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::class_model::ClassInstance;
use crate::function::FunctionDef;

/// Tri-valued boolean: `false`, `true`, or `maybe`. `maybe` is truthy but cannot be
/// coerced to a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tri {
    False = 0,
    True = 1,
    Maybe = 2,
}

impl fmt::Display for Tri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::False => "false",
            Self::True => "true",
            Self::Maybe => "maybe",
        })
    }
}

/// Wraps `f64` so it can be used as a `BTreeMap` key. NaN keys are rejected before
/// insertion, so `total_cmp` never needs to special-case them for our purposes; it is
/// still used because it gives a real total order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayKey(pub f64);

impl Eq for ArrayKey {}

impl PartialOrd for ArrayKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArrayKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

pub type ArrayMap = BTreeMap<ArrayKey, Value>;

/// Reference to a method bound to a specific instance.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub target: Rc<std::cell::RefCell<ClassInstance>>,
    pub method_name: String,
    pub function: Rc<FunctionDef>,
}

/// The runtime value type. `Array` is an immutable persistent snapshot: index-assignment
/// rebuilds a new map and rebinds the owning identifier rather than mutating in place.
/// `Object`/`Method` share ownership via `Rc` since class instances are long-lived
/// singletons referenced from many places.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(Rc<str>),
    Boolean(Tri),
    Null,
    Undefined,
    Array(Rc<ArrayMap>),
    Object(Rc<std::cell::RefCell<ClassInstance>>),
    Method(Rc<BoundMethod>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercionError {
    MaybeToNumber,
    NonNumericString,
    NotCoercible,
}

impl Value {
    #[must_use]
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::String(s.into())
    }

    #[must_use]
    pub fn array_from(entries: Vec<(f64, Value)>) -> Self {
        let mut map = ArrayMap::new();
        for (k, v) in entries {
            if !k.is_nan() {
                map.insert(ArrayKey(k), v);
            }
        }
        Self::Array(Rc::new(map))
    }

    /// Truthiness: `maybe` is truthy; empty string/array and zero are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Number(n) => *n != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Boolean(Tri::False) => false,
            Self::Boolean(Tri::True | Tri::Maybe) => true,
            Self::Null | Self::Undefined => false,
            Self::Array(arr) => !arr.is_empty(),
            Self::Object(_) | Self::Method(_) => true,
        }
    }

    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "Number",
            Self::String(_) => "String",
            Self::Boolean(_) => "Boolean",
            Self::Null => "Null",
            Self::Undefined => "Undefined",
            Self::Array(_) => "Array",
            Self::Object(_) => "Object",
            Self::Method(_) => "Method",
        }
    }

    /// Total-to-number coercion. Fails only for `maybe`, non-numeric strings, and
    /// `Undefined`/`Null`/`Array`/`Object`/`Method`.
    pub fn to_number(&self) -> Result<f64, CoercionError> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Boolean(Tri::False) => Ok(0.0),
            Self::Boolean(Tri::True) => Ok(1.0),
            Self::Boolean(Tri::Maybe) => Err(CoercionError::MaybeToNumber),
            Self::String(s) => s.trim().parse::<f64>().map_err(|_| CoercionError::NonNumericString),
            Self::Null | Self::Undefined | Self::Array(_) | Self::Object(_) | Self::Method(_) => {
                Err(CoercionError::NotCoercible)
            }
        }
    }

    /// Renders with invariant formatting and shortest round-trip form for numbers.
    #[must_use]
    pub fn display_string(&self) -> String {
        match self {
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Null => "null".to_owned(),
            Self::Undefined => "undefined".to_owned(),
            Self::Array(arr) => {
                let inner = arr.values().map(Self::display_string).collect::<Vec<_>>().join(", ");
                format!("[{inner}]")
            }
            Self::Object(inst) => format!("[object {}]", inst.borrow().class_name),
            Self::Method(m) => format!("[method {}]", m.method_name),
        }
    }

    /// Reference identity for `Array`/`Object`/`Method`, used by the strict equality
    /// ladder.
    #[must_use]
    fn ref_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Method(a), Self::Method(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Loose `==`: numeric-coercing comparison.
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        if let (Ok(a), Ok(b)) = (self.to_number(), other.to_number()) {
            return a == b;
        }
        self.strict_eq(other)
    }

    /// Strict `===`: same-kind compare; reference equality for containers; epsilon
    /// `1e-9` for numbers.
    #[must_use]
    pub fn strict_eq(&self, other: &Self) -> bool {
        const EPSILON: f64 = 1e-9;
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => (a - b).abs() < EPSILON,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Null, Self::Null) | (Self::Undefined, Self::Undefined) => true,
            (Self::Array(_), Self::Array(_)) | (Self::Object(_), Self::Object(_)) | (Self::Method(_), Self::Method(_)) => {
                self.ref_eq(other)
            }
            _ => false,
        }
    }

    /// Very-strict `====`: strict, plus round-trip-identical textual representation
    /// for numbers.
    #[must_use]
    pub fn very_strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => format_number(*a) == format_number(*b),
            _ => self.strict_eq(other),
        }
    }

    /// Very-loose `><`: stringwise compare after `toString`.
    #[must_use]
    pub fn very_loose_eq(&self, other: &Self) -> bool {
        self.display_string() == other.display_string()
    }

    /// Compares two values for the purposes of history diffing (does assigning this
    /// value actually change the entry?). Uses strict equality, distinct from the four
    /// language-level equality operators a program can invoke directly.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }

    /// Exact bit-pattern identity, used by the delete-value poison set for numbers.
    /// NaN is rejected explicitly rather than poisoned, since `NaN != NaN` makes
    /// "equal to the poisoned value" undefined.
    #[must_use]
    pub fn number_bits(n: f64) -> Option<u64> {
        if n.is_nan() { None } else { Some(n.to_bits()) }
    }
}

/// Shortest round-trip decimal form, invariant locale. `f64::to_string` in Rust already
/// produces the shortest representation that round-trips (same guarantee as Grisu/Ryu
/// based formatters used elsewhere in the pack), so no separate formatting crate is
/// needed here.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".to_owned() } else { "-Infinity".to_owned() };
    }
    let mut s = n.to_string();
    if s.ends_with(".0") {
        s.truncate(s.len() - 2);
    }
    s
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}
