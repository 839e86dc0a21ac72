use std::sync::LazyLock;

use itertools::Itertools;
use rustc_hash::FxHashMap;

use super::{error::Exception, value::Value};
use crate::Interpreter;

type BuiltinFn = fn(&mut Interpreter, &[Value]) -> Result<Value, Exception>;

pub const EXCEPTION_TYPES: &[&str] = &[
    "Exception",
    "ValueError",
    "TypeError",
    "NameError",
    "ZeroDivisionError",
    "IndexError",
    "KeyError",
    "RuntimeError",
    "RecursionError",
    "IOError",
    "OverflowError",
    "EOFError",
    "SyntaxError",
];

#[derive(Clone, Debug)]
pub struct BuiltinFunction {
    pub name: &'static str,
    pub num_params: ParamNum,
    pub func: BuiltinFn,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParamNum {
    None,
    Fixed(u8),
    Range(u8, u8),
    AtLeast(u8),
}

impl ParamNum {
    #[inline(always)]
    pub fn is_valid(&self, num_args: usize) -> bool {
        match self {
            ParamNum::None => num_args == 0,
            ParamNum::Fixed(n) => num_args == *n as usize,
            ParamNum::Range(min, max) => num_args >= *min as usize && num_args <= *max as usize,
            ParamNum::AtLeast(min) => num_args >= *min as usize,
        }
    }

    fn describe(&self) -> String {
        match self {
            ParamNum::None => "no arguments".to_string(),
            ParamNum::Fixed(1) => "exactly one argument".to_string(),
            ParamNum::Fixed(n) => format!("exactly {} arguments", n),
            ParamNum::Range(min, max) => format!("from {} to {} arguments", min, max),
            ParamNum::AtLeast(min) => format!("at least {} arguments", min),
        }
    }
}

impl BuiltinFunction {
    fn new(name: &'static str, num_params: ParamNum, func: BuiltinFn) -> Self {
        Self {
            name,
            num_params,
            func,
        }
    }

    pub fn call(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value, Exception> {
        if !self.num_params.is_valid(args.len()) {
            return Err(Exception::type_error(format!(
                "{}() takes {} ({} given)",
                self.name,
                self.num_params.describe(),
                args.len()
            )));
        }
        if is_exception_type(self.name) {
            return construct_exception(self.name, args);
        }
        (self.func)(interpreter, args)
    }
}

pub static BUILTIN_FUNCTIONS: LazyLock<FxHashMap<&'static str, BuiltinFunction>> = LazyLock::new(|| {
    let mut map = FxHashMap::default();
    let mut register = |name: &'static str, num_params: ParamNum, func: BuiltinFn| {
        map.insert(name, BuiltinFunction::new(name, num_params, func));
    };

    register("print", ParamNum::AtLeast(0), |interpreter, args| {
        let text = args.iter().map(Value::to_string).join(" ");
        interpreter.write_output(&format!("{}\n", text))?;
        Ok(Value::None)
    });
    register("input", ParamNum::Range(0, 1), |interpreter, args| {
        if let Some(prompt) = args.first() {
            interpreter.write_output(&prompt.to_string())?;
        }
        let line = interpreter.read_line()?;
        if line.is_empty() {
            return Err(Exception::new("EOFError", "EOF when reading a line"));
        }
        Ok(Value::from(line.trim_end_matches(['\n', '\r'])))
    });
    register("readline", ParamNum::None, |interpreter, _| {
        Ok(Value::from(interpreter.read_line()?))
    });
    register("readlines", ParamNum::None, |interpreter, _| {
        let lines = interpreter.read_lines()?;
        Ok(Value::from(lines.into_iter().map(Value::from).collect::<Vec<_>>()))
    });
    register("flush", ParamNum::None, |interpreter, _| {
        interpreter.flush_output()?;
        Ok(Value::None)
    });
    register("isatty", ParamNum::None, |interpreter, _| Ok(Value::Bool(interpreter.isatty())));
    // The trace hook itself is fired by the interpreter after the call.
    register("breakpoint", ParamNum::None, |_, _| Ok(Value::None));
    register("len", ParamNum::Fixed(1), |_, args| match &args[0] {
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::List(list) => Ok(Value::Int(list.borrow().len() as i64)),
        Value::Dict(dict) => Ok(Value::Int(dict.borrow().len() as i64)),
        value => Err(Exception::type_error(format!(
            "object of type '{}' has no len()",
            value.type_name()
        ))),
    });
    register("str", ParamNum::Range(0, 1), |_, args| {
        Ok(Value::from(args.first().map(Value::to_string).unwrap_or_default()))
    });
    register("repr", ParamNum::Fixed(1), |_, args| Ok(Value::from(args[0].repr())));
    register("int", ParamNum::Range(0, 1), |_, args| match args.first() {
        None => Ok(Value::Int(0)),
        Some(Value::Int(n)) => Ok(Value::Int(*n)),
        Some(Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        Some(Value::Float(n)) => {
            if n.is_finite() {
                Ok(Value::Int(n.trunc() as i64))
            } else {
                Err(Exception::new("OverflowError", "cannot convert float infinity to integer"))
            }
        }
        Some(Value::Str(s)) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            Exception::value_error(format!("invalid literal for int() with base 10: {}", Value::from(&**s).repr()))
        }),
        Some(value) => Err(Exception::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            value.type_name()
        ))),
    });
    register("float", ParamNum::Range(0, 1), |_, args| match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| Exception::value_error(format!("could not convert string to float: {}", Value::from(&**s).repr()))),
        Some(value) => value.as_number().map(Value::Float).ok_or_else(|| {
            Exception::type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                value.type_name()
            ))
        }),
    });
    register("bool", ParamNum::Range(0, 1), |_, args| {
        Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
    });
    register("range", ParamNum::Range(1, 3), |_, args| {
        let ints = args
            .iter()
            .map(|arg| {
                arg.as_int().ok_or_else(|| {
                    Exception::type_error(format!("'{}' object cannot be interpreted as an integer", arg.type_name()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (start, stop, step) = match ints.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step] => (*start, *stop, *step),
            _ => return Err(Exception::type_error("range expected at most 3 arguments")),
        };

        if step == 0 {
            return Err(Exception::value_error("range() arg 3 must not be zero"));
        }

        let mut values = Vec::new();
        let mut n = start;
        while (step > 0 && n < stop) || (step < 0 && n > stop) {
            values.push(Value::Int(n));
            match n.checked_add(step) {
                Some(next) => n = next,
                None => break,
            }
        }
        Ok(Value::from(values))
    });
    register("abs", ParamNum::Fixed(1), |_, args| match &args[0] {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| Exception::new("OverflowError", "integer overflow")),
        Value::Float(n) => Ok(Value::Float(n.abs())),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        value => Err(Exception::type_error(format!(
            "bad operand type for abs(): '{}'",
            value.type_name()
        ))),
    });
    register("min", ParamNum::AtLeast(1), |_, args| extremum("min", args, std::cmp::Ordering::Less));
    register("max", ParamNum::AtLeast(1), |_, args| extremum("max", args, std::cmp::Ordering::Greater));
    register("type", ParamNum::Fixed(1), |_, args| Ok(Value::from(args[0].type_name())));
    register("append", ParamNum::Fixed(2), |_, args| match &args[0] {
        Value::List(list) => {
            list.borrow_mut().push(args[1].clone());
            Ok(Value::None)
        }
        value => Err(Exception::type_error(format!(
            "append() expects a list, not '{}'",
            value.type_name()
        ))),
    });

    // Instances are built by `BuiltinFunction::call`.
    for name in EXCEPTION_TYPES {
        register(name, ParamNum::Range(0, 1), |_, _| Ok(Value::None));
    }

    map
});

/// Builds an exception instance for `Type(message)` calls.
fn construct_exception(type_name: &str, args: &[Value]) -> Result<Value, Exception> {
    let message = args.first().map(Value::to_string).unwrap_or_default();
    Ok(Value::from(Exception::new(type_name, message)))
}

pub fn is_exception_type(name: &str) -> bool {
    EXCEPTION_TYPES.contains(&name)
}

fn extremum(name: &str, args: &[Value], wanted: std::cmp::Ordering) -> Result<Value, Exception> {
    let items = match args {
        [Value::List(list)] => list.borrow().clone(),
        [single] => {
            return Err(Exception::type_error(format!(
                "'{}' object is not iterable",
                single.type_name()
            )));
        }
        _ => args.to_vec(),
    };

    let mut iter = items.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| Exception::value_error(format!("{}() arg is an empty sequence", name)))?;

    for item in iter {
        match item.compare(&best) {
            Some(ordering) if ordering == wanted => best = item,
            Some(_) => {}
            None => {
                return Err(Exception::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    if wanted == std::cmp::Ordering::Less { "<" } else { ">" },
                    item.type_name(),
                    best.type_name()
                )));
            }
        }
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{BufferIo, Interpreter};

    fn call(name: &str, args: Vec<Value>) -> Result<Value, Exception> {
        let mut interpreter = Interpreter::new(Box::new(BufferIo::default()));
        BUILTIN_FUNCTIONS[name].call(&mut interpreter, &args)
    }

    #[rstest]
    #[case::len_str("len", vec![Value::from("abc")], "3")]
    #[case::int_from_str("int", vec![Value::from(" 42 ")], "42")]
    #[case::int_from_float("int", vec![Value::Float(-2.7)], "-2")]
    #[case::float_from_int("float", vec![Value::Int(2)], "2.0")]
    #[case::range_step("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)], "[5, 3, 1]")]
    #[case::max_args("max", vec![Value::Int(1), Value::Float(2.5), Value::Int(2)], "2.5")]
    #[case::min_list("min", vec![Value::from(vec![Value::Int(3), Value::Int(-1)])], "-1")]
    #[case::repr("repr", vec![Value::from("x")], "'x'")]
    #[case::type_name("type", vec![Value::None], "NoneType")]
    #[case::range_near_max("range", vec![Value::Int(1), Value::Int(i64::MAX), Value::Int(i64::MAX)], "[1]")]
    #[case::range_near_min("range", vec![Value::Int(-1), Value::Int(i64::MIN), Value::Int(i64::MIN)], "[-1]")]
    #[case::abs_negative("abs", vec![Value::Int(-3)], "3")]
    fn test_builtin(#[case] name: &str, #[case] args: Vec<Value>, #[case] expected: &str) {
        assert_eq!(call(name, args).unwrap().to_string(), expected);
    }

    #[rstest]
    #[case::len_int("len", vec![Value::Int(1)], "TypeError")]
    #[case::bad_int("int", vec![Value::from("x")], "ValueError")]
    #[case::arity("abs", vec![], "TypeError")]
    #[case::empty_max("max", vec![Value::from(vec![])], "ValueError")]
    #[case::zero_step("range", vec![Value::Int(1), Value::Int(2), Value::Int(0)], "ValueError")]
    #[case::abs_min("abs", vec![Value::Int(i64::MIN)], "OverflowError")]
    fn test_builtin_errors(#[case] name: &str, #[case] args: Vec<Value>, #[case] type_name: &str) {
        assert_eq!(call(name, args).unwrap_err().type_name, type_name);
    }

    #[test]
    fn test_exception_constructor() {
        let Value::Exception(exception) = call("ValueError", vec![Value::from("bad")]).unwrap() else {
            panic!("expected an exception instance");
        };
        assert_eq!(exception.title(), "ValueError: bad");
    }

    #[test]
    fn test_input_reads_from_io() {
        let io = BufferIo::new("alice\n");
        let output = io.clone();
        let mut interpreter = Interpreter::new(Box::new(io));

        let value = BUILTIN_FUNCTIONS["input"]
            .call(&mut interpreter, &[Value::from("name? ")])
            .unwrap();

        assert_eq!(value.to_string(), "alice");
        assert_eq!(output.output(), "name? ");

        let err = BUILTIN_FUNCTIONS["input"].call(&mut interpreter, &[]).unwrap_err();
        assert_eq!(err.type_name, "EOFError");
    }
}
