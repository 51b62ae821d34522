//! Console streams for handlers and middleware.
//!
//! Handlers that talk to the user (prompts, progress lines) go through
//! [`Injected::console`](crate::Injected::console) instead of touching
//! stdin/stdout directly, so the streams can be swapped out:
//!
//! ```rust
//! use mantle::{BufferConsole, Console};
//!
//! let console = BufferConsole::new().input("30\n");
//! let answer = console.prompt("Enter a number: ")?;
//! assert_eq!(answer, "30");
//! assert_eq!(console.output(), "Enter a number: ");
//! # Ok::<(), std::io::Error>(())
//! ```

use std::cell::{Cell, RefCell};
use std::io::{self, BufRead, Write};
use std::rc::Rc;

/// Line-oriented input and text output.
pub trait Console {
    /// Reads one line without its line ending. `None` at end of input.
    fn read_line(&self) -> io::Result<Option<String>>;

    /// Writes `text` as is and flushes.
    fn write_str(&self, text: &str) -> io::Result<()>;

    fn println(&self, text: &str) -> io::Result<()> {
        self.write_str(text)?;
        self.write_str("\n")
    }

    /// Writes `message`, then reads a line. Running out of input is an error.
    fn prompt(&self, message: &str) -> io::Result<String> {
        self.write_str(message)?;
        self.read_line()?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no input to read"))
    }
}

impl<C: Console + ?Sized> Console for Rc<C> {
    fn read_line(&self) -> io::Result<Option<String>> {
        (**self).read_line()
    }

    fn write_str(&self, text: &str) -> io::Result<()> {
        (**self).write_str(text)
    }
}

fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// The process's stdin and stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn read_line(&self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(strip_line_ending(&line).to_string()))
    }

    fn write_str(&self, text: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()
    }
}

/// In-memory console: input comes from a string, output is collected.
///
/// With [`echo_input`](BufferConsole::echo_input), every consumed line is
/// also written to the output, the way a terminal shows typed input.
#[derive(Debug, Default)]
pub struct BufferConsole {
    input: RefCell<String>,
    pos: Cell<usize>,
    output: RefCell<String>,
    echo: Cell<bool>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the text that reads will consume.
    pub fn input(self, input: impl Into<String>) -> Self {
        self.set_input(input);
        self
    }

    pub fn echo_input(self, echo: bool) -> Self {
        self.set_echo_input(echo);
        self
    }

    pub fn set_echo_input(&self, echo: bool) {
        self.echo.set(echo);
    }

    /// Replaces the pending input and rewinds to its start.
    pub fn set_input(&self, input: impl Into<String>) {
        *self.input.borrow_mut() = input.into();
        self.pos.set(0);
    }

    /// Everything written so far.
    pub fn output(&self) -> String {
        self.output.borrow().clone()
    }

    /// Returns the output written so far and clears it.
    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.borrow_mut())
    }
}

impl Console for BufferConsole {
    fn read_line(&self) -> io::Result<Option<String>> {
        let input = self.input.borrow();
        let start = self.pos.get();
        if start >= input.len() {
            return Ok(None);
        }
        let end = input[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(input.len());
        self.pos.set(end);
        let raw = &input[start..end];
        if self.echo.get() {
            self.output.borrow_mut().push_str(raw);
        }
        Ok(Some(strip_line_ending(raw).to_string()))
    }

    fn write_str(&self, text: &str) -> io::Result<()> {
        self.output.borrow_mut().push_str(text);
        Ok(())
    }
}
