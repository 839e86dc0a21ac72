use std::{cell::RefCell, rc::Rc};

use itertools::Itertools;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::value::Value;

pub type SharedEnv = Rc<RefCell<Env>>;

/// A flat variable scope. Functions get a fresh `Env` per call; the module
/// scope doubles as the globals of every frame.
#[derive(Debug, Clone, Default)]
pub struct Env {
    context: FxHashMap<SmolStr, Value>,
}

/// A variable as listed by a debugger.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub type_field: String,
}

impl Variable {
    fn from(name: &SmolStr, value: &Value) -> Self {
        Variable {
            name: name.to_string(),
            value: value.repr(),
            type_field: value.type_name().to_string(),
        }
    }
}

impl Env {
    pub fn shared() -> SharedEnv {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn define(&mut self, name: impl Into<SmolStr>, value: Value) {
        self.context.insert(name.into(), value);
    }

    pub fn resolve(&self, name: &str) -> Option<Value> {
        self.context.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.context.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.context.len()
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }

    /// Name/value pairs sorted by name.
    pub fn entries(&self) -> Vec<(SmolStr, Value)> {
        self.context
            .iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn variables(&self) -> Vec<Variable> {
        self.context
            .iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(name, value)| Variable::from(name, value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_resolve() {
        let mut env = Env::default();
        env.define("b", Value::Int(2));
        env.define("a", Value::from("x"));

        assert!(env.contains("a"));
        assert!(env.resolve("c").is_none());
        assert_eq!(
            env.variables(),
            vec![
                Variable {
                    name: "a".to_string(),
                    value: "'x'".to_string(),
                    type_field: "str".to_string(),
                },
                Variable {
                    name: "b".to_string(),
                    value: "2".to_string(),
                    type_field: "int".to_string(),
                },
            ]
        );
    }
}
