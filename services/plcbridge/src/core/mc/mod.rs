//! MELSEC MC protocol (3E binary frame) support
//!
//! Only batch access is implemented: read/write in word units and bit units
//! against a contiguous device range.

pub mod address;
pub mod frame;

pub use address::{DeviceAddress, DeviceType};
pub use frame::{Route, Units};
