//! User-defined function definitions, registered in a process-wide map keyed by name.

use crate::ast::Stmt;

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Vec<Stmt>,
}
