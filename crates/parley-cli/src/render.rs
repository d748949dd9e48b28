//! Terminal rendering of engine events.

use std::io::{self, Write};

use parley_engine::EngineEvent;

/// Renders one reply as it streams.
///
/// Reply text goes to `out`, activity hints to `status`.
#[derive(Debug, Default)]
pub struct Renderer {
    /// Reply text has been written on the current line.
    mid_line: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a single event.
    pub fn render<O, S>(
        &mut self,
        event: &EngineEvent,
        out: &mut O,
        status: &mut S,
    ) -> io::Result<()>
    where
        O: Write,
        S: Write,
    {
        match event {
            EngineEvent::MessageUpdated { delta, .. } => {
                write!(out, "{}", delta)?;
                out.flush()?;
                self.mid_line = true;
            }
            EngineEvent::MessageReplaced { content, .. } => {
                // Whatever streamed before was discarded by the engine.
                if self.mid_line {
                    writeln!(out)?;
                }
                write!(out, "{}", content)?;
                out.flush()?;
                self.mid_line = true;
            }
            EngineEvent::HintChanged(Some(hint)) => {
                writeln!(status, "[{}]", hint)?;
            }
            EngineEvent::MessageAppended(_)
            | EngineEvent::HintChanged(None)
            | EngineEvent::InBandError { .. }
            | EngineEvent::Cleared => {}
        }
        Ok(())
    }

    /// Terminate the reply line, if one was started.
    pub fn finish<O: Write>(&mut self, out: &mut O) -> io::Result<()> {
        if self.mid_line {
            writeln!(out)?;
            self.mid_line = false;
        }
        out.flush()
    }
}
