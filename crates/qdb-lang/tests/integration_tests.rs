use qdb_lang::{BufferIo, Error, Interpreter, Options};
use rstest::{fixture, rstest};

#[fixture]
fn io() -> BufferIo {
    BufferIo::default()
}

fn run(io: &BufferIo, source: &str) -> Result<String, Error> {
    let mut interpreter = Interpreter::new(Box::new(io.clone()));
    interpreter.run_source("main.qs", source)?;
    Ok(io.output())
}

#[rstest]
#[case::arithmetic("print(1 + 2 * 3, 7 // 2, 7 % 3, 2 ** 3, 7 / 2)\n", "7 3 1 8 3.5\n")]
#[case::strings("s = 'ab'\nprint(s + \"cd\", len(s), s[1], s * 2)\n", "abcd 2 b abab\n")]
#[case::if_elif_else(
    "
def sign(x):
    if x < 0:
        return -1
    elif x == 0:
        return 0
    else:
        return 1

print(sign(-5), sign(0), sign(3))
",
    "-1 0 1\n"
)]
#[case::while_loop(
    "
n = 0
total = 0
while n < 5:
    n += 1
    if n == 2:
        continue
    total += n
print(total)
",
    "13\n"
)]
#[case::for_loop_with_break(
    "
found = None
for x in [3, 8, 12, 5]:
    if x > 10:
        found = x
        break
print(found)
",
    "12\n"
)]
#[case::recursion(
    "
def fib(n):
    if n < 2:
        return n
    return fib(n - 1) + fib(n - 2)

print(fib(15))
",
    "610\n"
)]
#[case::lists_and_dicts(
    "
xs = []
append(xs, 1)
append(xs, 2)
xs[0] = 10
d = {'a': 1}
d['b'] = 2
d['a'] += 5
print(xs, d, 'b' in d, 3 not in xs)
",
    "[10, 2] {'a': 6, 'b': 2} True True\n"
)]
#[case::globals(
    "
counter = 0

def bump():
    global counter
    counter += 1

bump()
bump()
print(counter)
",
    "2\n"
)]
#[case::locals_do_not_leak(
    "
x = 'outer'

def f():
    x = 'inner'
    return x

print(f(), x)
",
    "inner outer\n"
)]
#[case::try_except(
    "
def divide(a, b):
    try:
        return a / b
    except ZeroDivisionError as e:
        print('error:', e)
        return None
    finally:
        print('done')

print(divide(1, 0))
",
    "error: division by zero\ndone\nNone\n"
)]
#[case::reraise(
    "
try:
    try:
        raise ValueError('bad')
    except ValueError:
        raise
except Exception as e:
    print(type(e), e)
",
    "ValueError bad\n"
)]
#[case::short_circuit("print(0 or 'x', 1 and 2, not [])\n", "x 2 True\n")]
#[case::builtins(
    "print(str(12) + '!', int('7') + 1, float(1), bool(''), abs(-3), min(4, 2, 9), max([1, 5]), range(3))\n",
    "12! 8 1.0 False 3 2 5 [0, 1, 2]\n"
)]
#[case::repr("print(repr('a'), repr([1, 'b']), repr(None))\n", "'a' [1, 'b'] None\n")]
#[case::int_bounds(
    "big = 9223372036854775807\nprint(5 % big, -5 % big, range(1, big, big))\n",
    "5 9223372036854775802 [1]\n"
)]
fn test_run(io: BufferIo, #[case] source: &str, #[case] expected: &str) {
    assert_eq!(run(&io, source).unwrap(), expected);
}

#[rstest]
#[case::zero_division("x = 1\ny = x / 0\n", "ZeroDivisionError", 2)]
#[case::name_error("print(missing)\n", "NameError", 1)]
#[case::index_error("xs = [1]\nxs[3]\n", "IndexError", 2)]
#[case::key_error("d = {}\nd['k']\n", "KeyError", 2)]
#[case::type_error("1 + 'a'\n", "TypeError", 1)]
#[case::user_raise("raise RuntimeError('boom')\n", "RuntimeError", 1)]
#[case::floor_div_overflow("low = -9223372036854775807 - 1\nlow // -1\n", "OverflowError", 2)]
#[case::abs_overflow("low = -9223372036854775807 - 1\nabs(low)\n", "OverflowError", 2)]
fn test_uncaught_exception(io: BufferIo, #[case] source: &str, #[case] type_name: &str, #[case] line: usize) {
    match run(&io, source) {
        Err(Error::Exception(exception)) => {
            assert_eq!(exception.type_name, type_name);
            assert_eq!(exception.traceback.last().map(|frame| frame.line), Some(line));
        }
        other => panic!("expected {} but got {:?}", type_name, other),
    }
}

#[test]
fn test_traceback_spans_calls() {
    let io = BufferIo::default();
    let source = "def inner(x):\n    return 1 / x\n\ndef outer():\n    return inner(0)\n\nouter()\n";

    let Err(Error::Exception(exception)) = run(&io, source) else {
        panic!("expected an exception");
    };

    let functions: Vec<_> = exception.traceback.iter().map(|f| f.function.as_str()).collect();
    assert_eq!(functions, vec!["<module>", "outer", "inner"]);
    assert_eq!(exception.traceback[2].source, "    return 1 / x");
    assert!(exception.format().ends_with("ZeroDivisionError: division by zero\n"));
}

#[test]
fn test_recursion_limit() {
    let io = BufferIo::default();
    let mut interpreter = Interpreter::with_options(Box::new(io), Options { max_call_depth: 20 });

    let result = interpreter.run_source("main.qs", "def f(n):\n    return f(n + 1)\n\nf(0)\n");

    let Err(Error::Exception(exception)) = result else {
        panic!("expected RecursionError");
    };
    assert_eq!(exception.type_name, "RecursionError");
}

#[test]
fn test_syntax_error() {
    let io = BufferIo::default();
    let result = run(&io, "x = (1 +\n");
    assert!(matches!(result, Err(Error::Syntax(_))));
}

#[test]
fn test_input_and_readlines() {
    let io = BufferIo::new("bob\nline 1\nline 2\n");
    let source = "name = input('who? ')\nrest = readlines()\nprint('hi', name, len(rest))\n";
    assert_eq!(run(&io, source).unwrap(), "who? hi bob 2\n");
}

#[test]
fn test_run_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("script.qs");
    std::fs::write(&path, "print('from file')\n").unwrap();

    let io = BufferIo::default();
    let mut interpreter = Interpreter::new(Box::new(io.clone()));
    interpreter.run_file(&path).unwrap();
    assert_eq!(io.output(), "from file\n");

    let missing = interpreter.run_file(&dir.path().join("missing.qs"));
    assert!(matches!(missing, Err(Error::Io { .. })));
}
