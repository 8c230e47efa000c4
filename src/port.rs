use anyhow::Result;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::time::Duration;

use crate::cli::SerialOpts;

/// Write timeout used by the controller; the device side never blocks longer.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(200);

pub fn open_port(opts: &SerialOpts) -> Result<Box<dyn SerialPort>> {
    let builder = serialport::new(&opts.dev, opts.baud)
        .timeout(WRITE_TIMEOUT)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None);

    let port = builder
        .open()
        .map_err(|e| anyhow::anyhow!("open {}: {}", opts.dev, e))?;
    tracing::info!(dev = %opts.dev, baud = opts.baud, "serial port open");
    Ok(port)
}
