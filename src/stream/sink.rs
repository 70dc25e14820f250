use std::io::{self, Write};

use super::reconcile::RenderAction;

/// Destination for everything the assembler decides to show.
pub trait Sink {
    fn render(&mut self, action: &RenderAction) -> io::Result<()>;

    /// A finished code block.
    fn code_block(&mut self, code: &str) -> io::Result<()>;

    /// One line of location output.
    fn location(&mut self, line: &str) -> io::Result<()>;
}

/// Writes straight to a terminal stream, flushing after every write.
#[derive(Debug)]
pub struct TerminalSink<W: Write> {
    out: W,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Sink for TerminalSink<W> {
    fn render(&mut self, action: &RenderAction) -> io::Result<()> {
        match action {
            RenderAction::AppendSuffix(suffix) => self.out.write_all(suffix.as_bytes())?,
            RenderAction::RedrawLine { erase_width, text } => {
                write!(self.out, "\r{:width$}\r{text}", "", width = *erase_width)?
            }
            RenderAction::Unchanged => return Ok(()),
        }
        self.out.flush()
    }

    fn code_block(&mut self, code: &str) -> io::Result<()> {
        write!(self.out, "\n\n{code}\n")?;
        self.out.flush()
    }

    fn location(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }
}
