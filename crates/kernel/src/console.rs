use std::fmt::Debug;

use parking_lot::Mutex;
use types::ProcessId;

/// Sink for the diagnostic text programs emit with `PRINT`.
pub trait Console: Send + Sync + Debug {
    fn print(&self, origin: ProcessId, text: &str);
}

/// Writes each line to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn print(&self, _origin: ProcessId, text: &str) {
        println!("{text}");
    }
}

/// Keeps everything printed in memory, tagged with the printing process.
#[derive(Debug, Default)]
pub struct BufferConsole {
    lines: Mutex<Vec<(ProcessId, String)>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn lines_from(&self, origin: ProcessId) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(id, _)| *id == origin)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn take(&self) -> Vec<(ProcessId, String)> {
        std::mem::take(&mut *self.lines.lock())
    }
}

impl Console for BufferConsole {
    fn print(&self, origin: ProcessId, text: &str) {
        self.lines.lock().push((origin, text.to_string()));
    }
}
