//! Lexical scopes for name resolution inside a function body

use std::collections::HashMap;

use crate::typed_ast::BindingId;

/// Stack of name → binding maps; inner scopes shadow outer ones
#[derive(Debug, Clone)]
pub struct TypeEnv {
    scopes: Vec<HashMap<String, BindingId>>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self { scopes: vec![HashMap::new()] }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn declare(&mut self, name: String, binding: BindingId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, binding);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<BindingId> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for TypeEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing_and_pop() {
        let mut env = TypeEnv::new();
        env.declare("x".into(), 0);
        env.push_scope();
        env.declare("x".into(), 1);
        assert_eq!(env.lookup("x"), Some(1));
        env.pop_scope();
        assert_eq!(env.lookup("x"), Some(0));
        assert_eq!(env.lookup("y"), None);
    }

    #[test]
    fn test_root_scope_is_never_popped() {
        let mut env = TypeEnv::new();
        env.pop_scope();
        assert_eq!(env.depth(), 1);
    }
}
