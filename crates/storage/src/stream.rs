use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Open/closed flag shared between a cell and its current stream. The
/// cell can force-close a stream by clearing it.
#[derive(Debug, Clone)]
pub(crate) struct StreamFlag(Arc<AtomicBool>);

impl StreamFlag {
    pub fn open() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::Release);
    }

    fn check(&self) -> io::Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "cell stream was closed"))
        }
    }
}

/// Read side of a cell. Dropping it closes the stream.
#[derive(Debug)]
pub struct CellReader {
    file: File,
    flag: StreamFlag,
}

impl CellReader {
    pub(crate) fn new(file: File, flag: StreamFlag) -> Self {
        Self { file, flag }
    }

    pub fn is_open(&self) -> bool {
        self.flag.is_open()
    }

    pub fn close(self) {}
}

impl Read for CellReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.flag.check()?;
        self.file.read(buf)
    }
}

impl Drop for CellReader {
    fn drop(&mut self) {
        self.flag.close();
    }
}

/// Write side of a cell. Dropping it flushes and closes the stream.
#[derive(Debug)]
pub struct CellWriter {
    file: File,
    flag: StreamFlag,
}

impl CellWriter {
    pub(crate) fn new(file: File, flag: StreamFlag) -> Self {
        Self { file, flag }
    }

    pub fn is_open(&self) -> bool {
        self.flag.is_open()
    }

    /// Flush to disk and release the cell.
    pub fn close(self) -> io::Result<()> {
        self.flag.check()?;
        self.file.sync_all()
    }
}

impl Write for CellWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.flag.check()?;
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flag.check()?;
        self.file.flush()
    }
}

impl Drop for CellWriter {
    fn drop(&mut self) {
        self.flag.close();
    }
}
