//! Destination of `print`

use std::io::{self, Write};

#[derive(Debug, Default)]
pub enum OutputSink {
    #[default]
    Stdout,
    /// Collected in memory, one line per print
    Buffer(String),
}

impl OutputSink {
    pub fn write_line(&mut self, line: &str) {
        match self {
            // a closed stdout is not a program error
            OutputSink::Stdout => {
                let _ = writeln!(io::stdout().lock(), "{}", line);
            }
            OutputSink::Buffer(buffer) => {
                buffer.push_str(line);
                buffer.push('\n');
            }
        }
    }

    pub fn captured(&self) -> Option<&str> {
        match self {
            OutputSink::Stdout => None,
            OutputSink::Buffer(buffer) => Some(buffer),
        }
    }
}
