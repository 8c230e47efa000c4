//! Authoritative device state and its transitions.
//!
//! Fields are private: the only ways to change a `LinkState` are the methods
//! below, and the emergency-stop override lives in exactly one of them.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// `remaining_time` value meaning "no active timer".
pub const NO_TIMER: i16 = -1;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("emergency stop is engaged; reset it before changing the state")]
    EmergencyStopEngaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colour {
    #[default]
    Red,
    Amber,
    Green,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Detail {
    #[default]
    Off,
    AB,
    CD,
}

/// Operating mode whose maximum time applies on emergency stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Target,
    Matchplay,
}

/// Mode -> maximum time lookup, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeLimits {
    pub target: i16,
    pub matchplay: i16,
}

impl ModeLimits {
    pub fn max_time(&self, mode: Mode) -> i16 {
        match mode {
            Mode::Target => self.target,
            Mode::Matchplay => self.matchplay,
        }
    }
}

/// Full non-emergency state applied in one step.
///
/// Anything not set stays at the idle default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateCommand {
    pub countdown_continues: bool,
    pub last_end: bool,
    pub matchplay: bool,
    pub countdown: bool,
    pub detail: Detail,
    pub colour: Colour,
    pub time_enabled: bool,
    pub time: i16,
    pub start_beeps: i16,
    pub end_beeps: i16,
}

impl Default for StateCommand {
    fn default() -> Self {
        Self {
            countdown_continues: false,
            last_end: false,
            matchplay: false,
            countdown: false,
            detail: Detail::Off,
            colour: Colour::Red,
            time_enabled: false,
            time: 0,
            start_beeps: 0,
            end_beeps: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkState {
    countdown_continues: bool,
    last_end: bool,
    emergency_stop: bool,
    matchplay: bool,
    countdown: bool,
    detail: Detail,
    colour: Colour,
    time_enabled: bool,
    remaining_time: i16,
    start_beeps: i16,
    end_beeps: i16,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            countdown_continues: false,
            last_end: false,
            emergency_stop: false,
            matchplay: false,
            countdown: false,
            detail: Detail::Off,
            colour: Colour::Red,
            time_enabled: false,
            remaining_time: NO_TIMER,
            start_beeps: 0,
            end_beeps: 0,
        }
    }
}

impl LinkState {
    pub fn emergency_stop(&self) -> bool {
        self.emergency_stop
    }
    pub fn countdown(&self) -> bool {
        self.countdown
    }
    pub fn countdown_continues(&self) -> bool {
        self.countdown_continues
    }
    pub fn last_end(&self) -> bool {
        self.last_end
    }
    pub fn matchplay(&self) -> bool {
        self.matchplay
    }
    pub fn detail(&self) -> Detail {
        self.detail
    }
    pub fn colour(&self) -> Colour {
        self.colour
    }
    pub fn time_enabled(&self) -> bool {
        self.time_enabled
    }
    pub fn start_beeps(&self) -> i16 {
        self.start_beeps
    }
    pub fn end_beeps(&self) -> i16 {
        self.end_beeps
    }

    /// Time to show, or `None` while the timer is disabled.
    pub fn remaining_time(&self) -> Option<i16> {
        self.time_enabled.then_some(self.remaining_time)
    }

    /// Raw time field as it goes on the wire.
    pub fn raw_time(&self) -> i16 {
        self.remaining_time
    }

    /// Stop everything and show the active mode's maximum time on red.
    ///
    /// Valid from any state and idempotent.
    pub fn trigger_emergency_stop(&mut self, mode: Mode, limits: &ModeLimits) {
        self.emergency_stop = true;
        self.countdown = false;
        self.countdown_continues = false;
        self.time_enabled = false;
        self.colour = Colour::Red;
        self.remaining_time = limits.max_time(mode);
    }

    /// Leave emergency stop for the idle state. The stopped time is kept.
    pub fn clear_emergency_stop(&mut self) {
        let time = self.remaining_time;
        *self = Self {
            remaining_time: time,
            ..Self::default()
        };
    }

    pub fn apply(&mut self, cmd: StateCommand) -> Result<(), StateError> {
        self.ensure_running()?;
        *self = Self {
            countdown_continues: cmd.countdown_continues,
            last_end: cmd.last_end,
            emergency_stop: false,
            matchplay: cmd.matchplay,
            countdown: cmd.countdown,
            detail: cmd.detail,
            colour: cmd.colour,
            time_enabled: cmd.time_enabled,
            remaining_time: cmd.time,
            start_beeps: cmd.start_beeps,
            end_beeps: cmd.end_beeps,
        };
        Ok(())
    }

    pub fn set_colour(&mut self, colour: Colour) -> Result<(), StateError> {
        self.ensure_running()?;
        self.colour = colour;
        Ok(())
    }

    pub fn set_detail(&mut self, detail: Detail) -> Result<(), StateError> {
        self.ensure_running()?;
        self.detail = detail;
        Ok(())
    }

    pub fn set_countdown(&mut self, on: bool) -> Result<(), StateError> {
        self.ensure_running()?;
        self.countdown = on;
        Ok(())
    }

    pub fn set_time_enabled(&mut self, on: bool) -> Result<(), StateError> {
        self.ensure_running()?;
        self.time_enabled = on;
        Ok(())
    }

    pub fn set_remaining_time(&mut self, time: i16) -> Result<(), StateError> {
        self.ensure_running()?;
        self.remaining_time = time;
        Ok(())
    }

    pub fn set_beeps(&mut self, start: i16, end: i16) -> Result<(), StateError> {
        self.ensure_running()?;
        self.start_beeps = start;
        self.end_beeps = end;
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), StateError> {
        if self.emergency_stop {
            Err(StateError::EmergencyStopEngaged)
        } else {
            Ok(())
        }
    }

    pub(crate) fn from_parts(parts: StateParts) -> Self {
        Self {
            countdown_continues: parts.countdown_continues,
            last_end: parts.last_end,
            emergency_stop: parts.emergency_stop,
            matchplay: parts.matchplay,
            countdown: parts.countdown,
            detail: parts.detail,
            colour: parts.colour,
            time_enabled: parts.time_enabled,
            remaining_time: parts.time,
            start_beeps: parts.start_beeps,
            end_beeps: parts.end_beeps,
        }
    }
}

/// Decoded fields straight off the wire, before they become a `LinkState`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StateParts {
    pub countdown_continues: bool,
    pub last_end: bool,
    pub emergency_stop: bool,
    pub matchplay: bool,
    pub countdown: bool,
    pub detail: Detail,
    pub colour: Colour,
    pub time_enabled: bool,
    pub time: i16,
    pub start_beeps: i16,
    pub end_beeps: i16,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "estop={} matchplay={} countdown={} continues={} last_end={} detail={} colour={} time=",
            self.emergency_stop,
            self.matchplay,
            self.countdown,
            self.countdown_continues,
            self.last_end,
            self.detail,
            self.colour,
        )?;
        match self.remaining_time() {
            Some(t) => write!(f, "{}", t)?,
            None => f.write_str("off")?,
        }
        write!(f, " beeps={}/{}", self.start_beeps, self.end_beeps)
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Colour::Red => "red",
            Colour::Amber => "amber",
            Colour::Green => "green",
        })
    }
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Detail::Off => "off",
            Detail::AB => "ab",
            Detail::CD => "cd",
        })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Target => "target",
            Mode::Matchplay => "matchplay",
        })
    }
}

impl FromStr for Colour {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "red" => Ok(Colour::Red),
            "amber" => Ok(Colour::Amber),
            "green" => Ok(Colour::Green),
            _ => Err(()),
        }
    }
}
impl FromStr for Detail {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Detail::Off),
            "ab" => Ok(Detail::AB),
            "cd" => Ok(Detail::CD),
            _ => Err(()),
        }
    }
}
impl FromStr for Mode {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "target" => Ok(Mode::Target),
            "matchplay" => Ok(Mode::Matchplay),
            _ => Err(()),
        }
    }
}
