//! Shared handle on the interactive terminal.
//!
//! The shell, the permission prompt, and the clipboard all talk to the same
//! terminal. Each operation takes the lock for its whole exchange so a
//! question and its answer are never interleaved with other output.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Streams {
    input: Box<dyn BufRead + Send>,
    output: Box<dyn Write + Send>,
}

/// Cloneable handle on a line-oriented input and output pair.
#[derive(Clone)]
pub struct Terminal {
    streams: Arc<Mutex<Streams>>,
}

impl Terminal {
    /// Wraps arbitrary streams.
    pub fn new<R, W>(input: R, output: W) -> Self
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        Self {
            streams: Arc::new(Mutex::new(Streams {
                input: Box::new(input),
                output: Box::new(output),
            })),
        }
    }

    /// The process's standard input and output.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }

    fn lock(&self) -> MutexGuard<'_, Streams> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes `text` followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the output stream.
    pub fn say(&self, text: &str) -> io::Result<()> {
        let mut streams = self.lock();
        writeln!(streams.output, "{text}")?;
        streams.output.flush()
    }

    /// Writes `question` without a newline and reads the reply.
    ///
    /// Returns `None` once the input is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from either stream.
    pub fn ask(&self, question: &str) -> io::Result<Option<String>> {
        let mut streams = self.lock();
        write!(streams.output, "{question}")?;
        streams.output.flush()?;
        let mut line = String::new();
        if streams.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.strip_suffix('\n').unwrap_or(&line);
        Ok(Some(trimmed.strip_suffix('\r').unwrap_or(trimmed).to_owned()))
    }
}
