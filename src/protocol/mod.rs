//! Wire protocol layer: constants, frame envelope and the byte framer.

pub mod constants;
pub mod frame;
pub mod framer;

pub use constants::{checksum, DeviceId, PacketId, V1Mode};
pub use constants::{FRAME_EOF, FRAME_OVERHEAD, FRAME_SOF, MAX_FRAME_LEN, MIN_FRAME_LEN};
pub use frame::Frame;
pub use framer::{ByteFramer, FramerStats};
