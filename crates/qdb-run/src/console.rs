use std::{
    borrow::Cow,
    fs,
    io::{self, Write},
    path::PathBuf,
};

use colored::Colorize;
use miette::IntoDiagnostic;
use qdb::{Console, cli::PROMPT};
use rustyline::{
    At, Cmd, CompletionType, Config, Context, EditMode, Editor, Helper, KeyCode, KeyEvent, Modifiers, Movement, Word,
    completion::Completer,
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    history::DefaultHistory,
    validate::Validator,
};

const COMMANDS: &[&str] = &[
    "backtrace", "break", "bt", "clear", "continue", "disable", "enable", "env", "exit", "help", "jump", "list", "next",
    "print", "quit", "return", "run", "step", "tbreak", "where",
];

pub fn config_dir() -> Option<PathBuf> {
    std::env::var_os("QDB_CONFIG_DIR")
        .map(PathBuf::from)
        .or_else(|| dirs::config_dir().map(|d| d.join("qdb")))
}

/// Terminal console with line editing and a persistent command history.
pub struct EditorConsole {
    editor: Editor<QdbHelper, DefaultHistory>,
    history: Option<PathBuf>,
}

impl EditorConsole {
    pub fn new(color: bool) -> miette::Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .color_mode(if color {
                rustyline::ColorMode::Enabled
            } else {
                rustyline::ColorMode::Disabled
            })
            .build();
        let mut editor = Editor::with_config(config).into_diagnostic()?;

        editor.set_helper(Some(QdbHelper { color }));
        editor.bind_sequence(
            KeyEvent(KeyCode::Left, Modifiers::CTRL),
            Cmd::Move(Movement::BackwardWord(1, Word::Big)),
        );
        editor.bind_sequence(
            KeyEvent(KeyCode::Right, Modifiers::CTRL),
            Cmd::Move(Movement::ForwardWord(1, At::AfterEnd, Word::Big)),
        );

        let history = config_dir().map(|dir| {
            fs::create_dir_all(&dir).ok();
            dir.join("history.txt")
        });
        if let Some(history) = &history
            && editor.load_history(history).is_err()
        {
            tracing::debug!(path = %history.display(), "No previous history");
        }

        Ok(Self { editor, history })
    }
}

impl Console for EditorConsole {
    fn readline(&mut self, prompt: &str) -> io::Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                // program input is not a debugger command
                if prompt == PROMPT && !line.trim().is_empty() {
                    self.editor.add_history_entry(line.as_str()).ok();
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Io(err)) => Err(err),
            Err(err) => Err(io::Error::other(err)),
        }
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()
    }
}

impl Drop for EditorConsole {
    fn drop(&mut self) {
        if let Some(history) = &self.history
            && let Err(err) = self.editor.save_history(history)
        {
            tracing::warn!(error = %err, "Failed to save history");
        }
    }
}

pub struct QdbHelper {
    color: bool,
}

impl Helper for QdbHelper {}

impl Hinter for QdbHelper {
    type Hint = String;
}

impl Validator for QdbHelper {}

impl Completer for QdbHelper {
    type Candidate = String;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<String>)> {
        let word = &line[..pos];
        if word.contains(char::is_whitespace) {
            return Ok((pos, Vec::new()));
        }

        let candidates = COMMANDS
            .iter()
            .filter(|command| command.starts_with(word))
            .map(|command| command.to_string())
            .collect();
        Ok((0, candidates))
    }
}

impl Highlighter for QdbHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(&'s self, prompt: &'p str, _default: bool) -> Cow<'b, str> {
        if self.color {
            prompt.cyan().to_string().into()
        } else {
            Cow::Borrowed(prompt)
        }
    }
}
