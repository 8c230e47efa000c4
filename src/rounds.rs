//! Round sequencing: walk-up and shooting phases driven by a local clock.
//!
//! Each phase is sent once when it starts; the device runs its own countdown
//! from that frame. The sequencer keeps its own count of the seconds left to
//! know when to warn and when to start the next phase. The link state is
//! only changed by frames that are actually sent.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::session::{Controller, LinkError};
use crate::settings::Settings;
use crate::state::{Colour, Detail, Mode, StateCommand, StateError};

/// Seconds archers get to walk up to the shooting line.
pub const WALK_UP_TIME: i16 = 10;

#[derive(Debug, Error)]
pub enum RoundError {
    #[error("shooting time {0}s does not fit the timer")]
    TimeOutOfRange(i64),
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn detail(self) -> Detail {
        match self {
            Side::Left => Detail::AB,
            Side::Right => Detail::CD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    Target { detail: Detail },
    Matchplay { side: Side },
    EquipFail { arrows: u16, per_arrow: Option<u16> },
}

impl Round {
    pub fn mode(&self) -> Mode {
        match self {
            Round::Matchplay { .. } => Mode::Matchplay,
            _ => Mode::Target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    pub name: &'static str,
    pub cmd: StateCommand,
    /// Switch to amber with this many seconds left.
    pub warn_at: Option<i16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Completed,
    /// Emergency stop engaged while the round was running.
    Aborted,
    /// Superseded by another operator action.
    Cancelled,
}

/// Idle scoring state: red light, full time shown, no countdown.
pub fn score_command(settings: &Settings) -> StateCommand {
    StateCommand {
        time_enabled: true,
        time: settings.target_max_time,
        end_beeps: 3,
        ..Default::default()
    }
}

/// `continues` tells the device a shooting countdown follows, so it keeps
/// the display lit at zero. Matchplay ends leave it clear.
fn walk_up(detail: Detail, matchplay: bool, continues: bool) -> Phase {
    Phase {
        name: "walk-up",
        cmd: StateCommand {
            countdown_continues: continues,
            matchplay,
            countdown: true,
            detail,
            colour: Colour::Amber,
            time_enabled: true,
            time: WALK_UP_TIME,
            start_beeps: 2,
            end_beeps: 1,
            ..Default::default()
        },
        warn_at: None,
    }
}

fn shooting(detail: Detail, matchplay: bool, time: i16, warn: i16) -> Phase {
    Phase {
        name: "shooting",
        cmd: StateCommand {
            matchplay,
            countdown: true,
            detail,
            colour: Colour::Green,
            time_enabled: true,
            time,
            end_beeps: 3,
            ..Default::default()
        },
        warn_at: (warn > 0 && warn < time).then_some(warn),
    }
}

/// Build the phase list for a round from the current settings.
pub fn plan(round: Round, settings: &Settings) -> Result<Vec<Phase>, RoundError> {
    let phases = match round {
        Round::Target { detail } => vec![
            walk_up(detail, false, true),
            shooting(
                detail,
                false,
                settings.target_max_time,
                settings.target_warn_time,
            ),
        ],
        Round::Matchplay { side } => vec![
            walk_up(side.detail(), true, false),
            shooting(
                side.detail(),
                true,
                settings.matchplay_max_time,
                settings.matchplay_warn_time,
            ),
        ],
        Round::EquipFail { arrows, per_arrow } => {
            if arrows == 0 {
                return Err(RoundError::Zero("arrows"));
            }
            let per_arrow = match per_arrow {
                Some(0) => return Err(RoundError::Zero("per_arrow")),
                Some(p) => i64::from(p),
                None => i64::from(settings.equip_fail_time),
            };
            let total = i64::from(arrows) * per_arrow;
            let time = i16::try_from(total).map_err(|_| RoundError::TimeOutOfRange(total))?;
            vec![
                walk_up(Detail::Off, false, true),
                shooting(Detail::Off, false, time, settings.target_warn_time),
            ]
        }
    };
    Ok(phases)
}

/// Shared flag a newer operator action sets to stop the running round.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct Sequencer<W: Write + Send> {
    ctl: Arc<Controller<W>>,
    tick: Duration,
    cancel: CancelToken,
}

impl<W: Write + Send> Sequencer<W> {
    pub fn new(ctl: Arc<Controller<W>>, tick: Duration, cancel: CancelToken) -> Self {
        Self { ctl, tick, cancel }
    }

    pub fn run(&self, mode: Mode, phases: &[Phase]) -> Result<RoundOutcome, LinkError> {
        if self.ctl.is_stopped()? {
            return Ok(RoundOutcome::Aborted);
        }
        self.ctl.set_mode(mode)?;

        for phase in phases {
            if let Some(outcome) = self.interrupted()? {
                return Ok(outcome);
            }
            match self.ctl.apply(phase.cmd) {
                Ok(_) => {}
                Err(LinkError::State(StateError::EmergencyStopEngaged)) => {
                    return Ok(RoundOutcome::Aborted);
                }
                Err(e) => return Err(e),
            }
            info!(phase = phase.name, time = phase.cmd.time, "phase started");

            let mut left = phase.cmd.time;
            while left > 0 {
                std::thread::sleep(self.tick);
                if let Some(outcome) = self.interrupted()? {
                    info!(phase = phase.name, ?outcome, "round interrupted");
                    return Ok(outcome);
                }
                left -= 1;
                debug!(phase = phase.name, left, "tick");
                if phase.warn_at == Some(left) {
                    // Restarts the device countdown from where it should be.
                    let warned = self.ctl.update(|s| {
                        s.set_colour(Colour::Amber)?;
                        s.set_remaining_time(left)
                    });
                    if let Err(LinkError::State(_)) = warned {
                        return Ok(RoundOutcome::Aborted);
                    }
                    warned?;
                }
            }
        }
        Ok(RoundOutcome::Completed)
    }

    fn interrupted(&self) -> Result<Option<RoundOutcome>, LinkError> {
        if self.ctl.is_stopped()? {
            Ok(Some(RoundOutcome::Aborted))
        } else if self.cancel.is_cancelled() {
            Ok(Some(RoundOutcome::Cancelled))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{LIMITS, Wire};

    fn quick_settings() -> Settings {
        Settings {
            target_max_time: 5,
            matchplay_max_time: 4,
            target_warn_time: 2,
            matchplay_warn_time: 0,
            ..Settings::default()
        }
    }

    #[test]
    fn target_plan_matches_field_procedure() {
        let phases = plan(Round::Target { detail: Detail::CD }, &Settings::default()).unwrap();
        assert_eq!(phases.len(), 2);

        let walk = phases[0].cmd;
        assert_eq!(walk.colour, Colour::Amber);
        assert_eq!(walk.time, WALK_UP_TIME);
        assert!(walk.countdown_continues);
        assert_eq!((walk.start_beeps, walk.end_beeps), (2, 1));

        let shoot = phases[1].cmd;
        assert_eq!(shoot.colour, Colour::Green);
        assert_eq!(shoot.time, 240);
        assert_eq!(shoot.detail, Detail::CD);
        assert_eq!(shoot.end_beeps, 3);
        assert_eq!(phases[1].warn_at, Some(30));
    }

    #[test]
    fn matchplay_side_selects_detail() {
        let phases = plan(Round::Matchplay { side: Side::Right }, &Settings::default()).unwrap();
        assert!(phases.iter().all(|p| p.cmd.matchplay));
        assert!(phases.iter().all(|p| p.cmd.detail == Detail::CD));
        assert!(!phases[0].cmd.countdown_continues);
        assert_eq!(phases[1].cmd.time, 20);
        // 30s warning is longer than the 20s end.
        assert_eq!(phases[1].warn_at, None);
        assert_eq!(Round::Matchplay { side: Side::Left }.mode(), Mode::Matchplay);
    }

    #[test]
    fn equip_fail_time_is_arrows_times_per_arrow() {
        let s = Settings::default();
        let phases = plan(
            Round::EquipFail {
                arrows: 3,
                per_arrow: None,
            },
            &s,
        )
        .unwrap();
        assert_eq!(phases[1].cmd.time, 120);
        assert!(phases[0].cmd.countdown_continues);

        let phases = plan(
            Round::EquipFail {
                arrows: 2,
                per_arrow: Some(25),
            },
            &s,
        )
        .unwrap();
        assert_eq!(phases[1].cmd.time, 50);

        assert!(matches!(
            plan(
                Round::EquipFail {
                    arrows: 1000,
                    per_arrow: Some(1000)
                },
                &s
            ),
            Err(RoundError::TimeOutOfRange(1_000_000))
        ));
        assert!(matches!(
            plan(
                Round::EquipFail {
                    arrows: 0,
                    per_arrow: None
                },
                &s
            ),
            Err(RoundError::Zero("arrows"))
        ));
    }

    #[test]
    fn runs_to_completion_with_warning() {
        let wire = Wire::default();
        let ctl = Arc::new(Controller::new(wire.clone(), LIMITS));
        let phases = plan(Round::Target { detail: Detail::AB }, &quick_settings()).unwrap();
        let seq = Sequencer::new(Arc::clone(&ctl), Duration::from_millis(1), CancelToken::new());

        assert_eq!(
            seq.run(Mode::Target, &phases).unwrap(),
            RoundOutcome::Completed
        );
        let sent = wire.states();
        // walk-up, shooting, amber warning
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].colour(), Colour::Amber);
        assert_eq!(sent[1].colour(), Colour::Green);
        assert_eq!(sent[2].colour(), Colour::Amber);
        assert_eq!(sent[2].remaining_time(), Some(2));
        assert!(sent[2].countdown());
        // Counting down locally never changes the state behind the wire's back.
        assert_eq!(ctl.snapshot().unwrap(), sent[2]);
    }

    #[test]
    fn emergency_stop_aborts_round() {
        let wire = Wire::default();
        let ctl = Arc::new(Controller::new(wire.clone(), LIMITS));
        let phases = plan(Round::Matchplay { side: Side::Left }, &Settings::default()).unwrap();
        let seq = Sequencer::new(
            Arc::clone(&ctl),
            Duration::from_millis(20),
            CancelToken::new(),
        );

        let runner = std::thread::spawn(move || seq.run(Mode::Matchplay, &phases));
        std::thread::sleep(Duration::from_millis(50));
        ctl.emergency_stop().unwrap();

        assert_eq!(runner.join().unwrap().unwrap(), RoundOutcome::Aborted);
        let sent = wire.states();
        let last = sent.last().unwrap();
        assert!(last.emergency_stop());
        assert_eq!(last.raw_time(), LIMITS.matchplay);
    }

    #[test]
    fn cancel_stops_without_estop() {
        let wire = Wire::default();
        let ctl = Arc::new(Controller::new(wire.clone(), LIMITS));
        let phases = plan(Round::Target { detail: Detail::AB }, &Settings::default()).unwrap();
        let cancel = CancelToken::new();
        let seq = Sequencer::new(Arc::clone(&ctl), Duration::from_millis(5), cancel.clone());

        cancel.cancel();
        assert_eq!(
            seq.run(Mode::Target, &phases).unwrap(),
            RoundOutcome::Cancelled
        );
        assert!(!ctl.is_stopped().unwrap());
    }

    #[test]
    fn refuses_to_start_while_stopped() {
        let wire = Wire::default();
        let ctl = Arc::new(Controller::new(wire.clone(), LIMITS));
        ctl.emergency_stop().unwrap();
        let phases = plan(Round::Target { detail: Detail::AB }, &Settings::default()).unwrap();
        let seq = Sequencer::new(Arc::clone(&ctl), Duration::from_millis(1), CancelToken::new());
        assert_eq!(
            seq.run(Mode::Target, &phases).unwrap(),
            RoundOutcome::Aborted
        );
        assert_eq!(wire.states().len(), 1);
    }

    #[test]
    fn score_state_is_idle_red() {
        let cmd = score_command(&Settings::default());
        assert_eq!(cmd.colour, Colour::Red);
        assert!(!cmd.countdown);
        assert!(cmd.time_enabled);
        assert_eq!(cmd.time, 240);
    }
}
