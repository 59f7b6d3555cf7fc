//! The iec module contains the components responsible for the core
//! IEC 62056-21 protocol implementation: the frame codec, the register and
//! OBIS models, the serial link and the session state machine.

pub mod frame;
pub mod registers;
pub mod serial;
pub mod serial_mock;
pub mod session;

pub use frame::*;
pub use registers::*;
pub use serial::*;
pub use session::*;
