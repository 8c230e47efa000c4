//! Operator-side serial link for an archery field timer.
//!
//! The controller owns one [`state::LinkState`], applies operator and timer
//! transitions to it (emergency stop has priority over everything), and sends
//! every change to the device as a checksummed frame.

pub mod checksum;
pub mod cli;
pub mod console;
pub mod frame;
pub mod port;
pub mod rounds;
pub mod rx;
pub mod session;
pub mod settings;
pub mod state;
pub mod stats;
pub mod tx;
