use qdb_lang::{Key, Value, Variable};
use serde_json::{Map, Number};

/// Longest `repr` sent to the frontend by `do_eval` and in environments.
pub const MAX_REPR_LEN: usize = 255;

/// Converts a program value into JSON. Values with no JSON counterpart are
/// sent as their `repr`.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::None => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::from(*n),
        Value::Float(n) => Number::from_f64(*n).map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::List(items) => serde_json::Value::Array(items.borrow().iter().map(to_json).collect()),
        Value::Dict(entries) => serde_json::Value::Object(
            entries
                .borrow()
                .iter()
                .map(|(key, value)| (key_to_string(key), to_json(value)))
                .collect(),
        ),
        Value::Function(_) | Value::Builtin(_) | Value::Exception(_) => serde_json::Value::String(value.repr()),
    }
}

fn key_to_string(key: &Key) -> String {
    match key {
        Key::Int(n) => n.to_string(),
        Key::Str(s) => s.to_string(),
    }
}

pub fn short_repr(value: &Value) -> String {
    truncate(value.repr())
}

fn truncate(mut repr: String) -> String {
    if repr.chars().count() > MAX_REPR_LEN {
        repr = repr.chars().take(MAX_REPR_LEN - 3).collect();
        repr.push_str("...");
    }
    repr
}

/// `{name: repr}` for a scope.
pub fn scope_to_json(variables: Vec<Variable>) -> serde_json::Value {
    serde_json::Value::Object(
        variables
            .into_iter()
            .map(|variable| (variable.name, serde_json::Value::String(truncate(variable.value))))
            .collect::<Map<_, _>>(),
    )
}
