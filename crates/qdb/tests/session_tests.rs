use std::{cell::RefCell, collections::VecDeque, io, rc::Rc, time::Duration};

use qdb::{
    Cli, Console, Event, Frontend, FrontendError, Params, SessionError, SessionOptions,
    error::{INVALID_PARAMS, METHOD_NOT_FOUND},
    protocol::{Message, Request, Response},
    spawn_source,
    transport::Transport,
};
use rstest::rstest;
use serde_json::{Value, json};

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(10));

const CALLS: &str = "def add(a, b):
    c = a + b
    return c

x = 1
y = add(x, 2)
print(y)
";

const LOOP: &str = "total = 0
for i in range(3):
    total += i
print(total)
";

#[derive(Clone, Default)]
struct ScriptConsole {
    input: Rc<RefCell<VecDeque<String>>>,
    output: Rc<RefCell<String>>,
}

impl ScriptConsole {
    fn with_input(lines: &[&str]) -> Self {
        let console = Self::default();
        console
            .input
            .borrow_mut()
            .extend(lines.iter().map(|line| line.to_string()));
        console
    }
}

impl Console for ScriptConsole {
    fn readline(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.output.borrow_mut().push_str(prompt);
        Ok(self.input.borrow_mut().pop_front())
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        self.output.borrow_mut().push_str(text);
        Ok(())
    }
}

fn options(params: Params) -> SessionOptions {
    SessionOptions {
        params,
        ..SessionOptions::default()
    }
}

fn start(source: &str, params: Params) -> (qdb::BackendThread, Frontend<ScriptConsole>) {
    let (backend, transport) =
        spawn_source("main.qs".to_string(), source.to_string(), vec!["main.qs".to_string()], options(params))
            .unwrap();
    let mut frontend = Frontend::new(Box::new(transport), ScriptConsole::default());

    match frontend.next_event().unwrap() {
        Event::Startup { filename, argv, .. } => {
            assert_eq!(filename, "main.qs");
            assert_eq!(argv, vec!["main.qs".to_string()]);
        }
        event => panic!("expected startup, got {:?}", event),
    }
    (backend, frontend)
}

/// Waits for the next stop, collecting program output on the way.
fn stop(frontend: &mut Frontend<ScriptConsole>, output: &mut String) -> usize {
    loop {
        match frontend.next_event().unwrap() {
            Event::Interaction { lineno, .. } => return lineno,
            Event::Write(text) => output.push_str(&text),
            _ => {}
        }
    }
}

/// Drains events until the backend hangs up.
fn finish(frontend: &mut Frontend<ScriptConsole>) -> String {
    let mut output = String::new();
    loop {
        match frontend.next_event() {
            Ok(Event::Write(text)) => output.push_str(&text),
            Ok(event) => panic!("unexpected event {:?}", event),
            Err(FrontendError::Transport(_)) => return output,
            Err(err) => panic!("unexpected error {}", err),
        }
    }
}

#[test]
fn test_breakpoint_stops_before_commands() {
    let (backend, mut frontend) = start(CALLS, Params::default());

    assert_eq!(frontend.do_set_breakpoint("main.qs", 6, false, None).unwrap(), Some(1));
    frontend.run().unwrap();

    let mut output = String::new();
    assert_eq!(stop(&mut frontend, &mut output), 6);
    assert_eq!(frontend.do_inspect("1+1").unwrap(), json!(2));
    assert_eq!(frontend.do_inspect("x").unwrap(), json!(1));

    frontend.do_continue().unwrap();
    assert_eq!(finish(&mut frontend), "3\n");
    backend.join().unwrap();
}

#[test]
fn test_malformed_expression_keeps_session() {
    let (backend, mut frontend) = start(CALLS, Params::default());
    frontend.do_set_breakpoint("main.qs", 5, false, None).unwrap();
    frontend.run().unwrap();
    stop(&mut frontend, &mut String::new());

    let err = frontend.do_inspect("1+").unwrap_err();
    assert!(matches!(err, FrontendError::Rpc { code: 0, ref message } if message.starts_with("SyntaxError")));
    let err = frontend.do_inspect("missing").unwrap_err();
    assert!(matches!(err, FrontendError::Rpc { code: 0, ref message } if message.starts_with("NameError")));

    frontend.do_continue().unwrap();
    assert_eq!(finish(&mut frontend), "3\n");
    backend.join().unwrap();
}

#[rstest]
#[case::floor_div("(-9223372036854775807 - 1) // -1")]
#[case::abs("abs(-9223372036854775807 - 1)")]
#[case::add("9223372036854775807 + 1")]
fn test_integer_overflow_keeps_session(#[case] expr: &str) {
    let (backend, mut frontend) = start(CALLS, Params::default());
    frontend.do_set_breakpoint("main.qs", 5, false, None).unwrap();
    frontend.run().unwrap();
    stop(&mut frontend, &mut String::new());

    let err = frontend.do_inspect(expr).unwrap_err();
    assert!(matches!(err, FrontendError::Rpc { code: 0, ref message } if message.starts_with("OverflowError")));
    assert_eq!(frontend.do_inspect("1+1").unwrap(), json!(2));

    frontend.do_continue().unwrap();
    assert_eq!(finish(&mut frontend), "3\n");
    backend.join().unwrap();
}

#[test]
fn test_integer_bounds_at_breakpoint() {
    let (backend, mut frontend) = start(CALLS, Params::default());
    frontend.do_set_breakpoint("main.qs", 5, false, None).unwrap();
    frontend.run().unwrap();
    stop(&mut frontend, &mut String::new());

    assert_eq!(frontend.do_inspect("5 % 9223372036854775807").unwrap(), json!(5));
    assert_eq!(
        frontend.do_inspect("range(1, 9223372036854775807, 9223372036854775807)").unwrap(),
        json!([1])
    );
    assert_eq!(frontend.call("do_list", vec![json!(u64::MAX)]).unwrap(), json!(0));
    assert_eq!(frontend.call("do_list", vec![json!(6), json!(u64::MAX)]).unwrap(), json!(2));
    frontend.render_pending_output().unwrap();
    assert_eq!(
        frontend.console().output.borrow().as_str(),
        "main.qs:   6    \ty = add(x, 2)\n\
         main.qs:   7    \tprint(y)\n\
         [EOF]\n"
    );
    assert_eq!(frontend.do_inspect("1+1").unwrap(), json!(2));

    frontend.do_continue().unwrap();
    assert_eq!(finish(&mut frontend), "3\n");
    backend.join().unwrap();
}

#[rstest]
#[case::step_enters_call("do_step", 2)]
#[case::next_steps_over_call("do_next", 7)]
fn test_stepping_from_call_site(#[case] method: &str, #[case] expected: usize) {
    let (backend, mut frontend) = start(CALLS, Params::default());
    frontend.do_set_breakpoint("main.qs", 6, false, None).unwrap();
    frontend.run().unwrap();

    let mut output = String::new();
    assert_eq!(stop(&mut frontend, &mut output), 6);
    frontend.call(method, vec![]).unwrap();
    assert_eq!(stop(&mut frontend, &mut output), expected);

    frontend.do_continue().unwrap();
    output.push_str(&finish(&mut frontend));
    assert_eq!(output, "3\n");
    backend.join().unwrap();
}

#[test]
fn test_return_stops_in_caller() {
    let (backend, mut frontend) = start(CALLS, Params::default());
    frontend.do_set_breakpoint("main.qs", 2, false, None).unwrap();
    frontend.run().unwrap();

    let mut output = String::new();
    assert_eq!(stop(&mut frontend, &mut output), 2);
    assert_eq!(frontend.do_inspect("a + b").unwrap(), json!(3));
    let stack = frontend.do_where().unwrap();
    assert_eq!(
        stack.iter().map(|frame| frame.function.as_str()).collect::<Vec<_>>(),
        vec!["<module>", "add"]
    );

    frontend.do_return().unwrap();
    assert_eq!(stop(&mut frontend, &mut output), 7);
    assert_eq!(frontend.do_inspect("y").unwrap(), json!(3));
    assert_eq!(frontend.do_where().unwrap().len(), 1);

    frontend.do_step().unwrap();
    output.push_str(&finish(&mut frontend));
    assert_eq!(output, "3\n");
    backend.join().unwrap();
}

#[test]
fn test_interrupt_before_run_stops_at_first_line() {
    let (backend, mut frontend) = start(LOOP, Params::default());
    frontend.interrupt().unwrap();
    frontend.run().unwrap();

    let mut output = String::new();
    assert_eq!(stop(&mut frontend, &mut output), 1);
    frontend.do_next().unwrap();
    assert_eq!(stop(&mut frontend, &mut output), 2);
    frontend.do_quit().unwrap();

    assert_eq!(finish(&mut frontend), "");
    assert!(matches!(backend.join(), Err(SessionError::Program(qdb_lang::Error::Aborted))));
}

#[test]
fn test_quit_during_startup() {
    let (backend, mut frontend) = start(LOOP, Params::default());
    frontend.do_quit().unwrap();

    assert_eq!(finish(&mut frontend), "");
    assert!(matches!(backend.join(), Err(SessionError::Program(qdb_lang::Error::Aborted))));
}

#[test]
fn test_breakpoint_set_list_clear() {
    let (backend, mut frontend) = start(LOOP, Params::default());

    assert_eq!(frontend.do_set_breakpoint("main.qs", 3, false, Some("i == 2")).unwrap(), Some(1));
    assert_eq!(frontend.do_set_breakpoint("main.qs", 4, true, None).unwrap(), Some(2));
    assert_eq!(frontend.do_set_breakpoint("main.qs", 40, false, None).unwrap(), None);
    assert_eq!(frontend.do_set_breakpoint("other.qs", 1, false, None).unwrap(), None);

    let listed = frontend.do_list_breakpoint().unwrap();
    assert_eq!(
        listed
            .iter()
            .map(|bp| (bp.number, bp.filename.as_str(), bp.line, bp.temporary))
            .collect::<Vec<_>>(),
        vec![(1, "main.qs", 3, false), (2, "main.qs", 4, true)]
    );
    assert_eq!(listed[0].condition.as_deref(), Some("i == 2"));

    assert_eq!(frontend.do_clear_breakpoint("main.qs", 4).unwrap(), vec![2]);
    assert_eq!(frontend.do_clear_breakpoint("main.qs", 4).unwrap(), Vec::<usize>::new());
    assert_eq!(frontend.do_list_breakpoint().unwrap().len(), 1);

    frontend.run().unwrap();
    let mut output = String::new();
    assert_eq!(stop(&mut frontend, &mut output), 3);
    assert_eq!(frontend.do_inspect("[i, total]").unwrap(), json!([2, 1]));
    assert_eq!(frontend.do_list_breakpoint().unwrap()[0].hits, 1);

    assert_eq!(frontend.do_clear_file_breakpoints("main.qs").unwrap(), vec![1]);
    frontend.do_continue().unwrap();
    output.push_str(&finish(&mut frontend));
    assert_eq!(output, "3\n");
    backend.join().unwrap();
}

#[test]
fn test_temporary_breakpoint_is_removed_after_hit() {
    let (backend, mut frontend) = start(LOOP, Params::default());
    frontend.do_set_breakpoint("main.qs", 3, true, None).unwrap();
    frontend.run().unwrap();

    let mut output = String::new();
    assert_eq!(stop(&mut frontend, &mut output), 3);
    assert_eq!(frontend.do_inspect("i").unwrap(), json!(0));
    assert!(frontend.do_list_breakpoint().unwrap().is_empty());

    frontend.do_continue().unwrap();
    output.push_str(&finish(&mut frontend));
    assert_eq!(output, "3\n");
    backend.join().unwrap();
}

#[test]
fn test_disabled_breakpoint_does_not_stop() {
    let (backend, mut frontend) = start(LOOP, Params::default());
    frontend.do_set_breakpoint("main.qs", 3, false, None).unwrap();
    assert!(frontend.do_disable_breakpoint(1).unwrap());
    assert!(!frontend.do_enable_breakpoint(9).unwrap());
    frontend.run().unwrap();

    assert_eq!(finish(&mut frontend), "3\n");
    backend.join().unwrap();
}

#[test]
fn test_uncaught_exception_enters_post_mortem() {
    let source = "x = 1\ny = x / 0\nprint(y)\n";
    let (backend, mut frontend) = start(source, Params::default());
    frontend.run().unwrap();

    let mut exceptions = Vec::new();
    let lineno = loop {
        match frontend.next_event().unwrap() {
            Event::Exception {
                type_name, stack_trace, ..
            } => exceptions.push((type_name, stack_trace)),
            Event::Interaction { lineno, .. } => break lineno,
            event => panic!("unexpected event {:?}", event),
        }
    };

    assert_eq!(lineno, 2);
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].0, "ZeroDivisionError");
    assert_eq!(exceptions[0].1.last().map(|frame| frame.line), Some(2));
    assert_eq!(frontend.do_inspect("x").unwrap(), json!(1));

    frontend.do_continue().unwrap();
    assert_eq!(finish(&mut frontend), "");
    assert!(matches!(
        backend.join(),
        Err(SessionError::Program(qdb_lang::Error::Exception(e))) if e.type_name == "ZeroDivisionError"
    ));
}

#[test]
fn test_postmortem_disabled() {
    let source = "y = 1 / 0\n";
    let params = Params {
        postmortem: false,
        ..Params::default()
    };
    let (backend, mut frontend) = start(source, params);
    frontend.run().unwrap();

    assert_eq!(finish(&mut frontend), "");
    assert!(matches!(backend.join(), Err(SessionError::Program(qdb_lang::Error::Exception(_)))));
}

#[test]
fn test_syntax_error_is_reported_after_run() {
    let (backend, mut frontend) = start("x = (1 +\n", Params::default());
    frontend.run().unwrap();

    assert!(matches!(
        frontend.next_event().unwrap(),
        Event::Exception { ref type_name, .. } if type_name == "SyntaxError"
    ));
    assert_eq!(finish(&mut frontend), "");
    assert!(matches!(backend.join(), Err(SessionError::Program(qdb_lang::Error::Syntax(_)))));
}

#[test]
fn test_set_trace_stops_at_next_line() {
    let source = "x = 1\nbreakpoint()\ny = x + 1\n";
    let (backend, mut frontend) = start(source, Params::default());
    frontend.run().unwrap();

    assert_eq!(stop(&mut frontend, &mut String::new()), 3);
    frontend.do_continue().unwrap();
    finish(&mut frontend);
    backend.join().unwrap();
}

#[test]
fn test_exec_and_display_hook() {
    let (backend, mut frontend) = start(CALLS, Params::default());
    frontend.do_set_breakpoint("main.qs", 7, false, None).unwrap();
    frontend.run().unwrap();
    stop(&mut frontend, &mut String::new());

    frontend.do_exec("y = y * 10\ny + 1").unwrap();
    assert_eq!(frontend.next_event().unwrap(), Event::DisplayHook("31".to_string()));
    assert_eq!(frontend.do_eval("'a' * 3").unwrap(), "'aaa'");

    frontend.do_continue().unwrap();
    assert_eq!(finish(&mut frontend), "30\n");
    backend.join().unwrap();
}

#[test]
fn test_jump_within_block() {
    let source = "x = 1\nx = 2\nx = 3\nprint(x)\n";
    let (backend, mut frontend) = start(source, Params::default());
    frontend.do_set_breakpoint("main.qs", 2, false, None).unwrap();
    frontend.run().unwrap();
    stop(&mut frontend, &mut String::new());

    assert!(!frontend.do_jump(40).unwrap());
    assert!(frontend.do_jump(4).unwrap());
    frontend.do_continue().unwrap();

    assert_eq!(finish(&mut frontend), "1\n");
    backend.join().unwrap();
}

#[test]
fn test_list_streams_show_line() {
    let (backend, mut frontend) = start(LOOP, Params::default());
    frontend.do_set_breakpoint("main.qs", 3, false, None).unwrap();
    frontend.run().unwrap();
    stop(&mut frontend, &mut String::new());

    assert_eq!(frontend.do_list(None, None).unwrap(), 4);
    frontend.render_pending_output().unwrap();
    assert_eq!(
        frontend.console().output.borrow().as_str(),
        "main.qs:   1    \ttotal = 0\n\
         main.qs:   2    \tfor i in range(3):\n\
         main.qs:   3 B->\t    total += i\n\
         main.qs:   4    \tprint(total)\n\
         [EOF]\n"
    );

    frontend.do_clear(1).unwrap();
    frontend.do_continue().unwrap();
    assert_eq!(finish(&mut frontend), "3\n");
    backend.join().unwrap();
}

#[test]
fn test_interaction_kwargs() {
    let params = Params {
        call_stack: true,
        environment: true,
        ..Params::default()
    };
    let (backend, mut frontend) = start(CALLS, params);
    frontend.do_set_breakpoint("main.qs", 3, false, None).unwrap();
    frontend.run().unwrap();

    match frontend.next_event().unwrap() {
        Event::Interaction {
            lineno,
            call_stack,
            environment,
            ..
        } => {
            assert_eq!(lineno, 3);
            assert_eq!(call_stack.map(|stack| stack.len()), Some(2));
            let environment = environment.unwrap();
            assert_eq!(environment["locals"]["c"], json!("3"));
            assert_eq!(environment["globals"]["x"], json!("1"));
        }
        event => panic!("expected interaction, got {:?}", event),
    }

    let params = frontend.set_params(json!({"environment": false})).unwrap();
    assert!(params.call_stack && !params.environment && params.postmortem);
    assert!(frontend.set_params(json!({"colour": true})).is_err());

    frontend.do_continue().unwrap();
    finish(&mut frontend);
    backend.join().unwrap();
}

#[test]
fn test_readline_is_answered_by_frontend() {
    let source = "line = readline()\nprint(len(line))\nname = input('who? ')\nprint('hi ' + name)\n";
    let (backend, transport) =
        spawn_source("main.qs".to_string(), source.to_string(), vec![], SessionOptions::default()).unwrap();

    assert!(matches!(transport.receive(TIMEOUT).unwrap(), Message::Request(r) if r.method == "startup"));
    transport.send(&Request::notification("run", vec![]).into()).unwrap();

    let Message::Request(readline) = transport.receive(TIMEOUT).unwrap() else {
        panic!("expected a readline request");
    };
    assert_eq!(readline.method, "readline");
    let id = readline.id.unwrap();
    transport.send(&Response::ok(id, json!("hello\n")).into()).unwrap();

    assert_eq!(
        transport.receive(TIMEOUT).unwrap(),
        Request::notification("write", vec![json!("6\n")]).into()
    );
    assert_eq!(
        transport.receive(TIMEOUT).unwrap(),
        Request::notification("write", vec![json!("who? ")]).into()
    );

    let mut console = Frontend::new(Box::new(transport), ScriptConsole::with_input(&["bob"]));
    assert_eq!(console.next_event().unwrap(), Event::Write("hi bob\n".to_string()));
    backend.join().unwrap();
}

#[test]
fn test_one_response_per_request() {
    let (backend, transport) =
        spawn_source("main.qs".to_string(), LOOP.to_string(), vec![], SessionOptions::default()).unwrap();
    transport.receive(TIMEOUT).unwrap();

    let requests = vec![
        Request::call(10, "ping", vec![json!("a"), json!(1)]),
        Request::call(11, "do_fly", vec![]),
        Request::call(12, "do_set_breakpoint", vec![json!("main.qs")]),
        Request::call(13, "do_set_breakpoint", vec![json!("main.qs"), json!(3)]),
        Request::call(14, "do_list_breakpoint", vec![]),
    ];
    for request in &requests {
        transport.send(&request.clone().into()).unwrap();
    }

    let responses: Vec<Response> = (0..requests.len())
        .map(|_| match transport.receive(TIMEOUT).unwrap() {
            Message::Response(response) => response,
            message => panic!("expected a response, got {:?}", message),
        })
        .collect();

    assert_eq!(
        responses.iter().map(|response| response.id).collect::<Vec<_>>(),
        vec![Some(10), Some(11), Some(12), Some(13), Some(14)]
    );
    assert_eq!(responses[0].result, json!(["a", 1]));
    assert_eq!(responses[1].error.as_ref().map(|e| e.code), Some(METHOD_NOT_FOUND));
    assert_eq!(responses[2].error.as_ref().map(|e| e.code), Some(INVALID_PARAMS));
    assert_eq!(responses[3].result, json!(1));
    assert_eq!(responses[4].result, json!([[1, "main.qs", 3, false, true, 0, Value::Null]]));

    transport.send(&Request::call(15, "do_quit", vec![]).into()).unwrap();
    assert!(matches!(transport.receive(TIMEOUT).unwrap(), Message::Response(r) if r.id == Some(15)));
    assert!(backend.join().is_err());
}

#[test]
fn test_breakpoint_while_running() {
    let source = "n = 0\nwhile n < 100000:\n    n += 1\nprint(n)\n";
    let (backend, mut frontend) = start(source, Params::default());
    frontend.run().unwrap();
    assert_eq!(frontend.do_set_breakpoint("main.qs", 3, true, Some("n == 99999")).unwrap(), Some(1));

    let mut output = String::new();
    assert_eq!(stop(&mut frontend, &mut output), 3);
    assert_eq!(frontend.do_inspect("n").unwrap(), json!(99999));
    frontend.do_continue().unwrap();
    output.push_str(&finish(&mut frontend));
    assert_eq!(output, "100000\n");
    backend.join().unwrap();
}

#[test]
fn test_cli_session() {
    let (backend, transport) =
        spawn_source("main.qs".to_string(), LOOP.to_string(), vec![], SessionOptions::default()).unwrap();
    let console = ScriptConsole::with_input(&["b 3", "c", "p total", "cl 1", "c"]);
    let mut cli = Cli::new(Frontend::new(Box::new(transport), console.clone()));

    cli.run().unwrap();

    assert_eq!(
        console.output.borrow().as_str(),
        "(qdb) Breakpoint 1 at main.qs:3\n\
         (qdb) > main.qs(3)\n\
         ->     total += i\n\
         (qdb) 0\n\
         (qdb) Deleted breakpoint 1\n\
         (qdb) 3\n\
         The program finished\n"
    );
    backend.join().unwrap();
}
