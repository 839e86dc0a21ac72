use std::fmt;

type LineNo = usize;
type BreakpointNo = usize;

/// A breakpoint location typed at the prompt: `line` or `file:line`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub filename: Option<String>,
    pub line: LineNo,
}

impl Location {
    pub fn parse(s: &str) -> Option<Self> {
        match s.rsplit_once(':') {
            Some((filename, line)) if !filename.is_empty() => Some(Self {
                filename: Some(filename.to_string()),
                line: line.parse().ok()?,
            }),
            Some(_) => None,
            None => Some(Self {
                filename: None,
                line: s.parse().ok()?,
            }),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filename {
            Some(filename) => write!(f, "{}:{}", filename, self.line),
            None => write!(f, "{}", self.line),
        }
    }
}

#[derive(Debug, Clone, PartialEq, strum::EnumIter)]
pub enum Command {
    Step,
    Next,
    Continue,
    Return,
    Jump(LineNo),
    Quit,
    Breakpoint {
        location: Option<Location>,
        condition: Option<String>,
        temporary: bool,
    },
    Clear(Option<String>),
    Enable(BreakpointNo),
    Disable(BreakpointNo),
    Print(String),
    Exec(String),
    Where,
    List(Option<LineNo>, Option<LineNo>),
    Env,
    Help,
    Error(String),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Step => write!(f, "step"),
            Command::Next => write!(f, "next"),
            Command::Continue => write!(f, "continue"),
            Command::Return => write!(f, "return"),
            Command::Jump(line) => write!(f, "jump {}", line),
            Command::Quit => write!(f, "quit"),
            Command::Breakpoint {
                location,
                condition,
                temporary,
            } => {
                write!(f, "{}", if *temporary { "tbreak" } else { "break" })?;
                if let Some(location) = location {
                    write!(f, " {}", location)?;
                }
                if let Some(condition) = condition {
                    write!(f, " {}", condition)?;
                }
                Ok(())
            }
            Command::Clear(Some(arg)) => write!(f, "clear {}", arg),
            Command::Clear(None) => write!(f, "clear"),
            Command::Enable(number) => write!(f, "enable {}", number),
            Command::Disable(number) => write!(f, "disable {}", number),
            Command::Print(expr) => write!(f, "p {}", expr),
            Command::Exec(stmt) => write!(f, "! {}", stmt),
            Command::Where => write!(f, "where"),
            Command::List(Some(first), Some(last)) => write!(f, "list {}, {}", first, last),
            Command::List(Some(first), None) => write!(f, "list {}", first),
            Command::List(None, _) => write!(f, "list"),
            Command::Env => write!(f, "env"),
            Command::Help => write!(f, "help"),
            Command::Error(e) => write!(f, "error {}", e),
        }
    }
}

impl Command {
    pub fn help(&self) -> String {
        match self {
            Command::Step => format!("{:<24}{}", "s[tep]", "Stop at the next line, entering calls"),
            Command::Next => format!("{:<24}{}", "n[ext]", "Stop at the next line of this function"),
            Command::Continue => format!("{:<24}{}", "c[ontinue]", "Run until a breakpoint"),
            Command::Return => format!("{:<24}{}", "r[eturn]", "Run until the current function returns"),
            Command::Jump(_) => format!("{:<24}{}", "j[ump] LINE", "Set the next line to execute"),
            Command::Quit => format!("{:<24}{}", "q[uit]", "Abort the program and exit"),
            Command::Breakpoint { .. } => format!(
                "{:<24}{}",
                "b[reak] [FILE:]LINE [COND]", "Set a breakpoint, or list breakpoints"
            ),
            Command::Clear(_) => format!("{:<24}{}", "cl[ear] [NUM|FILE:LINE]", "Clear breakpoints"),
            Command::Enable(_) => format!("{:<24}{}", "enable NUM", "Enable a breakpoint"),
            Command::Disable(_) => format!("{:<24}{}", "disable NUM", "Disable a breakpoint"),
            Command::Print(_) => format!("{:<24}{}", "p EXPR", "Print the value of an expression"),
            Command::Exec(_) => format!("{:<24}{}", "! STMT", "Execute a statement in the current frame"),
            Command::Where => format!("{:<24}{}", "w[here] or bt", "Print the call stack"),
            Command::List(..) => format!("{:<24}{}", "l[ist] [FIRST[, LAST]]", "List source lines"),
            Command::Env => format!("{:<24}{}", "e[nv]", "Print local and global variables"),
            Command::Help => format!("{:<24}{}", "h[elp]", "Print command help"),
            Command::Error(_) => "".to_string(),
        }
    }

    /// Commands that let the program run again.
    pub fn resumes(&self) -> bool {
        matches!(
            self,
            Command::Step | Command::Next | Command::Continue | Command::Return | Command::Quit
        )
    }
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if let Some(stmt) = s.strip_prefix('!') {
            return Command::Exec(stmt.trim().to_string());
        }

        match s.split_whitespace().collect::<Vec<&str>>().as_slice() {
            ["step"] | ["s"] => Command::Step,
            ["next"] | ["n"] => Command::Next,
            ["continue"] | ["cont"] | ["c"] | ["run"] => Command::Continue,
            ["return"] | ["r"] => Command::Return,
            ["jump", line] | ["j", line] => match line.parse() {
                Ok(line) => Command::Jump(line),
                Err(_) => Command::Error(format!("Invalid line number: {}", line)),
            },
            ["jump"] | ["j"] => Command::Error("No line number provided for jump".to_string()),
            ["quit"] | ["q"] | ["exit"] => Command::Quit,
            [name @ ("break" | "b" | "tbreak"), rest @ ..] => {
                let temporary = *name == "tbreak";
                match rest {
                    [] => Command::Breakpoint {
                        location: None,
                        condition: None,
                        temporary,
                    },
                    [location, condition @ ..] => match Location::parse(location.trim_end_matches(',')) {
                        Some(location) => {
                            let condition = condition.join(" ");
                            let condition = condition.trim_start_matches(',').trim();
                            Command::Breakpoint {
                                location: Some(location),
                                condition: (!condition.is_empty()).then(|| condition.to_string()),
                                temporary,
                            }
                        }
                        None => Command::Error(format!("Invalid breakpoint location: {}", location)),
                    },
                }
            }
            ["clear", arg] | ["cl", arg] => Command::Clear(Some(arg.to_string())),
            ["clear"] | ["cl"] => Command::Clear(None),
            [name @ ("enable" | "disable"), number] => match number.parse() {
                Ok(number) if *name == "enable" => Command::Enable(number),
                Ok(number) => Command::Disable(number),
                Err(_) => Command::Error(format!("Invalid breakpoint number: {}", number)),
            },
            ["p" | "print", rest @ ..] => {
                let expr = rest.join(" ");
                if expr.is_empty() {
                    Command::Error("No expression provided for print".to_string())
                } else {
                    Command::Print(expr)
                }
            }
            ["where"] | ["w"] | ["bt"] | ["backtrace"] => Command::Where,
            ["list" | "l", rest @ ..] => {
                let numbers: Vec<Result<usize, _>> = rest
                    .join(" ")
                    .split(',')
                    .map(str::trim)
                    .filter(|arg| !arg.is_empty())
                    .map(str::parse)
                    .collect();
                match numbers.as_slice() {
                    [] => Command::List(None, None),
                    [Ok(first)] => Command::List(Some(*first), None),
                    [Ok(first), Ok(last)] => Command::List(Some(*first), Some(*last)),
                    _ => Command::Error(format!("Invalid list range: {}", rest.join(" "))),
                }
            }
            ["env"] | ["e"] => Command::Env,
            ["help"] | ["h"] | ["?"] => Command::Help,
            _ => Command::Exec(s.to_string()),
        }
    }
}
