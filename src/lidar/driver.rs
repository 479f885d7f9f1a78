//! RPLIDAR C1 command/handshake layer over a [`Transport`].

use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::transport::Transport;

pub const CMD_SCAN: [u8; 2] = [0xA5, 0x20];
pub const CMD_STOP: [u8; 2] = [0xA5, 0x25];
/// Response descriptor for a standard scan request
pub const SCAN_DESCRIPTOR: [u8; 7] = [0xA5, 0x5A, 0x05, 0x00, 0x00, 0x40, 0x81];

const STOP_SETTLE: Duration = Duration::from_millis(50);
const DESCRIPTOR_TIMEOUT: Duration = Duration::from_secs(1);
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Consecutive failed reads after which the error is handed to the caller
pub const MAX_READ_FAILURES: u32 = 20;

/// Outcome of the scan handshake. A mismatch is not fatal: the stream
/// decoder resynchronizes on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Handshake {
    Confirmed,
    Unexpected(Vec<u8>),
}

pub struct RplidarDriver<T: Transport> {
    transport: T,
    scanning: bool,
    read_failures: u32,
    retry_delay: Duration,
}

impl<T: Transport> RplidarDriver<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            scanning: false,
            read_failures: 0,
            retry_delay: READ_RETRY_DELAY,
        }
    }

    /// Pause between failed reads in [`RplidarDriver::read_or_retry`].
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Stop, flush stale input, request a standard scan and check the
    /// descriptor the sensor answers with.
    pub fn start_scan(&mut self) -> Result<Handshake> {
        self.transport.write_all(&CMD_STOP)?;
        self.transport.flush()?;
        std::thread::sleep(STOP_SETTLE);
        self.transport.clear_input()?;

        self.transport.write_all(&CMD_SCAN)?;
        self.transport.flush()?;

        let mut desc = [0u8; SCAN_DESCRIPTOR.len()];
        let mut got = 0;
        let start = Instant::now();
        while got < desc.len() && start.elapsed() < DESCRIPTOR_TIMEOUT {
            got += self.transport.read(&mut desc[got..])?;
        }
        self.scanning = true;

        if desc[..got] == SCAN_DESCRIPTOR[..] {
            log::info!("LIDAR scan started");
            Ok(Handshake::Confirmed)
        } else {
            log::warn!("Unexpected scan descriptor {:02X?}", &desc[..got]);
            Ok(Handshake::Unexpected(desc[..got].to_vec()))
        }
    }

    pub fn stop(&mut self) -> Result<()> {
        self.transport.write_all(&CMD_STOP)?;
        self.transport.flush()?;
        self.scanning = false;
        log::info!("LIDAR scan stopped");
        Ok(())
    }

    /// Read whatever the sensor has sent; `Ok(0)` means nothing yet.
    pub fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.transport.read(buf)
    }

    /// `read_available` for long-running loops. A failed read sleeps for the
    /// retry delay and reports `Ok(0)`; after [`MAX_READ_FAILURES`] in a row
    /// the error is returned. Disconnects are returned at once.
    pub fn read_or_retry(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.transport.read(buf) {
            Ok(n) => {
                self.read_failures = 0;
                Ok(n)
            }
            Err(Error::Disconnected) => Err(Error::Disconnected),
            Err(e) => {
                self.read_failures += 1;
                if self.read_failures >= MAX_READ_FAILURES {
                    log::error!("LIDAR read failed {} times in a row: {}", self.read_failures, e);
                    return Err(e);
                }
                log::warn!(
                    "LIDAR read failed ({}/{}): {}",
                    self.read_failures,
                    MAX_READ_FAILURES,
                    e
                );
                std::thread::sleep(self.retry_delay);
                Ok(0)
            }
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }
}
