//! Mock transport for testing

use super::Transport;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory transport; clones share the same buffers so a test can keep a
/// handle while the driver owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    /// Bytes that survive `clear_input` (they "arrive" after the clear)
    after_clear: Vec<u8>,
    /// Reads still to fail with an I/O error
    failing_reads: u32,
    disconnected: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockTransportInner>> {
        self.inner.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        if let Ok(mut inner) = self.lock() {
            inner.read_buffer.extend(data);
        }
    }

    /// Queue data that only becomes readable once the input is cleared,
    /// like a device reply to a command sent after the flush.
    pub fn inject_after_clear(&self, data: &[u8]) {
        if let Ok(mut inner) = self.lock() {
            inner.after_clear.extend_from_slice(data);
        }
    }

    /// Get all written data
    pub fn written(&self) -> Vec<u8> {
        self.lock().map(|inner| inner.write_buffer.clone()).unwrap_or_default()
    }

    /// Make the next `count` reads fail with an I/O error
    pub fn fail_reads(&self, count: u32) {
        if let Ok(mut inner) = self.lock() {
            inner.failing_reads = count;
        }
    }

    /// Simulate the device going away
    pub fn disconnect(&self) {
        if let Ok(mut inner) = self.lock() {
            inner.disconnected = true;
        }
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.lock()?;
        if inner.disconnected && inner.read_buffer.is_empty() {
            return Err(Error::Disconnected);
        }
        if inner.failing_reads > 0 {
            inner.failing_reads -= 1;
            return Err(Error::Io(std::io::Error::other("injected read failure")));
        }
        let available = inner.read_buffer.len().min(buffer.len());
        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..available)) {
            *slot = byte;
        }
        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.lock()?;
        if inner.disconnected {
            return Err(Error::Disconnected);
        }
        inner.write_buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.read_buffer.clear();
        let pending = std::mem::take(&mut inner.after_clear);
        inner.read_buffer.extend(pending);
        Ok(())
    }
}
