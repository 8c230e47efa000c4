//! The controller session: single owner of the link state and the transport.
//!
//! Every transition takes the lock, changes the state, frames it and writes
//! it before the lock is released, so a reader never sees a half-applied
//! emergency stop and frames go out in transition order.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frame::encode_state;
use crate::state::{LinkState, Mode, ModeLimits, StateCommand, StateError};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("serial write: {0}")]
    Io(#[from] io::Error),
    #[error("controller lock poisoned")]
    Poisoned,
}

struct Inner<W> {
    state: LinkState,
    mode: Mode,
    link: W,
    frames_sent: u64,
}

pub struct Controller<W: Write + Send> {
    inner: Mutex<Inner<W>>,
    limits: ModeLimits,
}

impl<W: Write + Send> Controller<W> {
    pub fn new(link: W, limits: ModeLimits) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: LinkState::default(),
                mode: Mode::default(),
                link,
                frames_sent: 0,
            }),
            limits,
        }
    }

    /// Read-only copy for display.
    pub fn snapshot(&self) -> Result<LinkState, LinkError> {
        Ok(self.lock()?.state)
    }

    pub fn is_stopped(&self) -> Result<bool, LinkError> {
        Ok(self.lock()?.state.emergency_stop())
    }

    pub fn mode(&self) -> Result<Mode, LinkError> {
        Ok(self.lock()?.mode)
    }

    /// Select the mode whose maximum time applies to an emergency stop.
    pub fn set_mode(&self, mode: Mode) -> Result<(), LinkError> {
        let mut inner = self.lock()?;
        if inner.mode != mode {
            debug!(%mode, "active mode changed");
        }
        inner.mode = mode;
        Ok(())
    }

    pub fn frames_sent(&self) -> Result<u64, LinkError> {
        Ok(self.lock()?.frames_sent)
    }

    /// Engage emergency stop and send it before returning.
    ///
    /// The transition itself cannot fail; an `Err` only reports the transport.
    pub fn emergency_stop(&self) -> Result<LinkState, LinkError> {
        let mut inner = self.lock()?;
        let mode = inner.mode;
        inner.state.trigger_emergency_stop(mode, &self.limits);
        warn!(%mode, time = inner.state.raw_time(), "emergency stop engaged");
        inner.send()?;
        Ok(inner.state)
    }

    pub fn clear_emergency_stop(&self) -> Result<LinkState, LinkError> {
        let mut inner = self.lock()?;
        if !inner.state.emergency_stop() {
            return Ok(inner.state);
        }
        inner.state.clear_emergency_stop();
        info!("emergency stop cleared");
        inner.send()?;
        Ok(inner.state)
    }

    /// Replace the running state wholesale and send it.
    pub fn apply(&self, cmd: StateCommand) -> Result<LinkState, LinkError> {
        self.update(|s| s.apply(cmd))
    }

    /// Run a group of mutators as one transition.
    ///
    /// The closure works on a copy; nothing is committed or sent if any
    /// mutator is rejected.
    pub fn update<F>(&self, f: F) -> Result<LinkState, LinkError>
    where
        F: FnOnce(&mut LinkState) -> Result<(), StateError>,
    {
        let mut inner = self.lock()?;
        let mut next = inner.state;
        f(&mut next)?;
        inner.state = next;
        info!(state = %inner.state, "state updated");
        inner.send()?;
        Ok(inner.state)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<W>>, LinkError> {
        self.inner.lock().map_err(|_| LinkError::Poisoned)
    }
}

impl<W: Write> Inner<W> {
    fn send(&mut self) -> Result<(), LinkError> {
        let frame = encode_state(&self.state);
        debug!(frame = %hex(&frame), "tx");
        self.link.write_all(&frame)?;
        self.link.flush()?;
        self.frames_sent += 1;
        Ok(())
    }
}

pub fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            s.push(' ');
        }
        let _ = write!(s, "{:02X}", b);
    }
    s
}
