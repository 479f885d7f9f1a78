//! Byte transport abstraction between the LIDAR driver and the wire.

use crate::error::Result;

mod mock;
mod serial;

pub use mock::MockTransport;
pub use serial::{SerialTransport, DEFAULT_BAUD};

/// Transport trait for device communication
///
/// `read` returning `Ok(0)` means "no data yet" and is never an error; a
/// vanished device is reported as [`crate::Error::Disconnected`].
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Write the whole buffer
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            let n = self.write(&data[written..])?;
            if n == 0 {
                return Err(crate::Error::Disconnected);
            }
            written += n;
        }
        Ok(())
    }

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Drop whatever the device already sent us
    fn clear_input(&mut self) -> Result<()>;
}
