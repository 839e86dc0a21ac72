use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, BufRead, IsTerminal, Write},
    rc::Rc,
};

/// The standard streams of a running program. Replacing the interpreter's
/// `Io` redirects `print`, `input` and friends.
pub trait Io {
    fn write(&mut self, text: &str) -> io::Result<()>;

    fn write_err(&mut self, text: &str) -> io::Result<()> {
        self.write(text)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Reads one line including its terminator. Returns an empty string at
    /// end of input.
    fn readline(&mut self) -> io::Result<String>;

    fn readlines(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let line = self.readline()?;
            if line.is_empty() {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    fn isatty(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct StdIo;

impl Io for StdIo {
    fn write(&mut self, text: &str) -> io::Result<()> {
        io::stdout().write_all(text.as_bytes())
    }

    fn write_err(&mut self, text: &str) -> io::Result<()> {
        io::stderr().write_all(text.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        io::stderr().flush()
    }

    fn readline(&mut self) -> io::Result<String> {
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    }

    fn isatty(&self) -> bool {
        io::stdin().is_terminal()
    }
}

/// In-memory streams for embedding and tests. Output is shared so it can be
/// inspected after the `BufferIo` has been moved into an interpreter.
#[derive(Debug, Default, Clone)]
pub struct BufferIo {
    input: Rc<RefCell<VecDeque<String>>>,
    output: Rc<RefCell<String>>,
}

impl BufferIo {
    pub fn new(input: &str) -> Self {
        let input = input.split_inclusive('\n').map(str::to_string).collect();
        Self {
            input: Rc::new(RefCell::new(input)),
            output: Rc::default(),
        }
    }

    pub fn output(&self) -> String {
        self.output.borrow().clone()
    }
}

impl Io for BufferIo {
    fn write(&mut self, text: &str) -> io::Result<()> {
        self.output.borrow_mut().push_str(text);
        Ok(())
    }

    fn readline(&mut self) -> io::Result<String> {
        Ok(self.input.borrow_mut().pop_front().unwrap_or_default())
    }
}
