//! Renders the conversation to the terminal.
//!
//! Assistant replies stream in as partial fragments on one line; the final
//! event rewrites that line with the authoritative text, the same way the
//! browser client replaces the in-progress message node. At most one
//! pending assistant message exists at any time.

use std::io::{self, Write};

/// ANSI: return to column 0 and erase the in-progress line.
const CLEAR_LINE: &str = "\r\x1b[2K";

/// One completed transcript entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A system/status/error notice.
    Notice { label: String, text: String },
    /// A user utterance (typed, or recognized from audio).
    User(String),
    /// A completed assistant reply.
    Assistant(String),
}

/// The conversation log plus the single in-progress assistant message.
pub struct Transcript<W: Write> {
    out: W,
    entries: Vec<Entry>,
    pending: Option<String>,
}

impl Transcript<io::Stdout> {
    pub fn stdout() -> Self {
        Transcript::new(io::stdout())
    }
}

impl<W: Write> Transcript<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            entries: Vec::new(),
            pending: None,
        }
    }

    /// Prints a labelled notice, e.g. `[system] Conversation reset.`
    pub fn notice(&mut self, label: &str, text: &str) -> io::Result<()> {
        self.break_pending_line()?;
        writeln!(self.out, "[{label}] {text}")?;
        self.out.flush()?;
        self.entries.push(Entry::Notice {
            label: label.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    /// Prints a user utterance.
    pub fn user(&mut self, text: &str) -> io::Result<()> {
        self.break_pending_line()?;
        writeln!(self.out, "you: {text}")?;
        self.out.flush()?;
        self.entries.push(Entry::User(text.to_string()));
        Ok(())
    }

    /// Appends a streamed fragment to the in-progress assistant message,
    /// starting one if none exists.
    pub fn partial(&mut self, fragment: &str) -> io::Result<()> {
        match &mut self.pending {
            Some(buf) => buf.push_str(fragment),
            None => {
                write!(self.out, "assistant: ")?;
                self.pending = Some(fragment.to_string());
            }
        }
        write!(self.out, "{fragment}")?;
        self.out.flush()
    }

    /// Closes the in-progress message, replacing its content with the
    /// authoritative final text. The next partial starts a fresh message.
    pub fn finalize(&mut self, text: &str) -> io::Result<()> {
        if self.pending.is_some() {
            write!(self.out, "{CLEAR_LINE}")?;
        }
        writeln!(self.out, "assistant: {text}")?;
        self.out.flush()?;
        self.pending = None;
        self.entries.push(Entry::Assistant(text.to_string()));
        Ok(())
    }

    /// True while a streamed reply is still accumulating.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// A notice or user line arriving mid-stream must not glue itself onto
    /// the partial assistant line.
    fn break_pending_line(&mut self) -> io::Result<()> {
        if self.pending.is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }
}
