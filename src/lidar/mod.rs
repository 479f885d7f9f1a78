//! LIDAR byte stream handling: record codec, revolution assembly, and the
//! command layer that starts and stops the sensor.

pub mod assembler;
pub mod decoder;
pub mod driver;

pub use assembler::ScanAssembler;
pub use decoder::{decode_next, encode_sample, RECORD_LEN};
pub use driver::{Handshake, RplidarDriver};
