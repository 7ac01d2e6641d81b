//! Terminal I/O used by the command loop.

use std::io::{self, BufRead, BufReader, Write};

pub const PROMPT: &str = "--> ";

pub trait Console {
    /// Blocks for one line of input, without its line ending.
    ///
    /// Returns `None` at end of input.
    fn read_line(&mut self) -> io::Result<Option<String>>;

    fn write_line(&mut self, text: &str) -> io::Result<()>;
}

/// Console printing to standard output, reading standard input by default.
///
/// Standard output is only locked while printing, never while waiting for
/// input, so other threads can still print then.
pub struct StdConsole<R = BufReader<io::Stdin>> {
    input: R,
    stdout: io::Stdout,
}

impl StdConsole {
    pub fn new() -> Self {
        Self::with_input(BufReader::new(io::stdin()))
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: BufRead> StdConsole<R> {
    pub fn with_input(input: R) -> Self {
        Self {
            input,
            stdout: io::stdout(),
        }
    }

    fn prompt(&self) -> io::Result<()> {
        let mut stdout = self.stdout.lock();
        write!(stdout, "{}", PROMPT)?;
        stdout.flush()
    }
}

impl<R: BufRead> Console for StdConsole<R> {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.prompt()?;

        let mut input = String::new();
        if self.input.read_line(&mut input)? == 0 {
            return Ok(None);
        }
        Ok(Some(strip_line_ending(&input).to_string()))
    }

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        let mut stdout = self.stdout.lock();
        writeln!(stdout, "{}", text)?;
        stdout.flush()
    }
}

fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}
