//! The class model: one singleton instance per class, field-level history instead of
//! bare slots, and an explicit fallback field consulted only when every other lookup
//! has missed.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::ClassDecl;
use crate::error::{ErrorKind, JestError, JestResult};
use crate::function::FunctionDef;
use crate::value::Value;
use crate::variable_store::History;

/// Static definition of a class, built once from its declaration.
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    pub name: String,
    pub property_names: Vec<String>,
    pub static_property_names: Vec<String>,
    pub property_initializers: HashMap<String, crate::ast::Expr>,
    pub static_property_initializers: HashMap<String, crate::ast::Expr>,
    pub instance_methods: HashMap<String, Rc<FunctionDef>>,
    pub static_methods: HashMap<String, Rc<FunctionDef>>,
    pub instance_fallback: Option<String>,
    pub static_fallback: Option<String>,
}

impl ClassDefinition {
    #[must_use]
    pub fn from_decl(decl: &ClassDecl) -> Self {
        let mut property_names = Vec::new();
        let mut static_property_names = Vec::new();
        let mut property_initializers = HashMap::new();
        let mut static_property_initializers = HashMap::new();
        for prop in &decl.properties {
            if prop.is_static {
                static_property_names.push(prop.name.clone());
                if let Some(init) = &prop.initializer {
                    static_property_initializers.insert(prop.name.clone(), init.clone());
                }
            } else {
                property_names.push(prop.name.clone());
                if let Some(init) = &prop.initializer {
                    property_initializers.insert(prop.name.clone(), init.clone());
                }
            }
        }
        let instance_methods = decl
            .instance_methods
            .iter()
            .map(|m| {
                (
                    m.name.clone(),
                    Rc::new(FunctionDef { name: m.name.clone(), parameters: m.parameters.clone(), body: m.body.clone() }),
                )
            })
            .collect();
        let static_methods = decl
            .static_methods
            .iter()
            .map(|m| {
                (
                    m.name.clone(),
                    Rc::new(FunctionDef { name: m.name.clone(), parameters: m.parameters.clone(), body: m.body.clone() }),
                )
            })
            .collect();
        Self {
            name: decl.name.clone(),
            property_names,
            static_property_names,
            property_initializers,
            static_property_initializers,
            instance_methods,
            static_methods,
            instance_fallback: decl.instance_fallback.clone(),
            static_fallback: decl.static_fallback.clone(),
        }
    }
}

/// One field's value history, scoped to a single instance or to the static side of a
/// class: field mutation behaves like variable assignment, so each field keeps its own
/// history.
pub type FieldHistory = History;

/// The single, lazily-created instance of a class. The first reference to a class
/// creates its one instance.
#[derive(Debug)]
pub struct ClassInstance {
    pub class_name: String,
    pub initialized: bool,
    fields: HashMap<String, FieldHistory>,
}

impl ClassInstance {
    #[must_use]
    pub fn new(class_name: String) -> Self {
        Self { class_name, initialized: false, fields: HashMap::new() }
    }

    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).map(FieldHistory::current)
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        match self.fields.get_mut(name) {
            Some(history) => history.assign(value),
            None => {
                self.fields.insert(name.to_owned(), FieldHistory::new(value));
            }
        }
    }

    pub fn field_history(&self, name: &str) -> Option<&FieldHistory> {
        self.fields.get(name)
    }

    pub fn field_previous(&mut self, name: &str) -> Option<(Value, bool)> {
        self.fields.get_mut(name).map(FieldHistory::go_previous)
    }

    pub fn field_next(&mut self, name: &str) -> Option<(Value, bool)> {
        self.fields.get_mut(name).map(FieldHistory::go_next)
    }
}

/// What a member-access resolved to. Resolution order: static method, static field,
/// instance method, instance field, instance fallback field, static fallback field,
/// else `Undefined`.
pub enum Member {
    Value(Value),
    Method(Rc<FunctionDef>),
}

/// Registry of class definitions and their singleton instances.
#[derive(Debug, Default)]
pub struct ClassModel {
    definitions: HashMap<String, Rc<ClassDefinition>>,
    static_fields: HashMap<String, HashMap<String, FieldHistory>>,
    instances: HashMap<String, Rc<std::cell::RefCell<ClassInstance>>>,
}

impl ClassModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: ClassDefinition) {
        let name = def.name.clone();
        self.static_fields.insert(name.clone(), HashMap::new());
        self.definitions.insert(name, Rc::new(def));
    }

    #[must_use]
    pub fn definition(&self, name: &str) -> Option<&Rc<ClassDefinition>> {
        self.definitions.get(name)
    }

    /// Returns the singleton instance, creating it (uninitialized) on first reference.
    pub fn instance(&mut self, name: &str) -> JestResult<Rc<std::cell::RefCell<ClassInstance>>> {
        if !self.definitions.contains_key(name) {
            return Err(JestError::new(ErrorKind::UnknownClass, format!("class '{name}' is not defined")));
        }
        if let Some(inst) = self.instances.get(name) {
            return Ok(Rc::clone(inst));
        }
        let inst = Rc::new(std::cell::RefCell::new(ClassInstance::new(name.to_owned())));
        self.instances.insert(name.to_owned(), Rc::clone(&inst));
        Ok(inst)
    }

    pub fn static_field(&self, class_name: &str, field: &str) -> Option<&Value> {
        self.static_fields.get(class_name)?.get(field).map(FieldHistory::current)
    }

    #[must_use]
    pub fn is_static_field(&self, class_name: &str, field: &str) -> bool {
        self.definitions.get(class_name).is_some_and(|d| d.static_property_names.iter().any(|n| n == field))
    }

    pub fn set_static_field(&mut self, class_name: &str, field: &str, value: Value) {
        let fields = self.static_fields.entry(class_name.to_owned()).or_default();
        match fields.get_mut(field) {
            Some(history) => history.assign(value),
            None => {
                fields.insert(field.to_owned(), FieldHistory::new(value));
            }
        }
    }

    /// Resolves a member access against a class, following the priority chain above.
    /// `instance` is provided lazily so callers that already hold the `Rc` avoid a
    /// second lookup.
    pub fn resolve_member(
        &self,
        class_name: &str,
        member: &str,
        instance: &std::cell::RefCell<ClassInstance>,
    ) -> Option<Member> {
        let def = self.definitions.get(class_name)?;
        if let Some(f) = def.static_methods.get(member) {
            return Some(Member::Method(Rc::clone(f)));
        }
        if let Some(v) = self.static_field(class_name, member) {
            return Some(Member::Value(v.clone()));
        }
        if let Some(f) = def.instance_methods.get(member) {
            return Some(Member::Method(Rc::clone(f)));
        }
        if let Some(v) = instance.borrow().get_field(member) {
            return Some(Member::Value(v.clone()));
        }
        if let Some(fallback) = &def.instance_fallback {
            if let Some(v) = instance.borrow().get_field(fallback) {
                return Some(Member::Value(v.clone()));
            }
        }
        if let Some(fallback) = &def.static_fallback {
            if let Some(v) = self.static_field(class_name, fallback) {
                return Some(Member::Value(v.clone()));
            }
        }
        None
    }
}
