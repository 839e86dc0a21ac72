use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    rc::Rc,
};

use itertools::Itertools;
use smol_str::SmolStr;

use super::error::Exception;
use crate::ast::FunctionDef;

pub type List = Rc<RefCell<Vec<Value>>>;
pub type Dict = Rc<RefCell<BTreeMap<Key, Value>>>;

/// Dictionary keys. Only hashable scalars are allowed; `True`/`False` are
/// stored as `1`/`0`.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone)]
pub enum Key {
    Int(i64),
    Str(SmolStr),
}

impl Key {
    pub fn from_value(value: &Value) -> Result<Self, Exception> {
        match value {
            Value::Int(n) => Ok(Key::Int(*n)),
            Value::Bool(b) => Ok(Key::Int(*b as i64)),
            Value::Str(s) => Ok(Key::Str(SmolStr::new(s))),
            _ => Err(Exception::type_error(format!("unhashable type: '{}'", value.type_name()))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(n) => Value::Int(*n),
            Key::Str(s) => Value::from(s.as_str()),
        }
    }
}

#[derive(Debug)]
pub struct Function {
    pub def: Rc<FunctionDef>,
    pub filename: Rc<str>,
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(List),
    Dict(Dict),
    Function(Rc<Function>),
    Builtin(SmolStr),
    Exception(Rc<Exception>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(values)))
    }
}

impl From<Exception> for Value {
    fn from(exception: Exception) -> Self {
        Value::Exception(Rc::new(exception))
    }
}

impl Value {
    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Exception(e) => &e.type_name,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(list) => !list.borrow().is_empty(),
            Value::Dict(dict) => !dict.borrow().is_empty(),
            Value::Function(_) | Value::Builtin(_) | Value::Exception(_) => true,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(*b as i64 as f64),
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The `repr()` of a value: strings are quoted, containers recurse.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => quote(s),
            Value::Exception(e) => e.repr(),
            _ => self.to_string(),
        }
    }

    /// Python-style equality: numbers compare across int/float/bool.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        ordering => return Some(ordering),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            (a, b) => a.as_number()?.partial_cmp(&b.as_number()?),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", format_float(*n)),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(list) => write!(f, "[{}]", list.borrow().iter().map(Value::repr).join(", ")),
            Value::Dict(dict) => write!(
                f,
                "{{{}}}",
                dict.borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.to_value().repr(), v.repr()))
                    .join(", ")
            ),
            Value::Function(func) => write!(f, "<function {}>", func.def.name),
            Value::Builtin(name) => write!(f, "<built-in function {}>", name),
            Value::Exception(e) => write!(f, "{}", e.message),
        }
    }
}

pub fn format_float(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{:.1}", n)
    } else {
        format!("{}", n)
    }
}

fn quote(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
