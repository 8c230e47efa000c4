// src/console.rs
//! Line-based operator console: `TAG key=value ...`, one command per line.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Result, anyhow};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::rounds::{self, CancelToken, Round, RoundOutcome, Sequencer, Side};
use crate::session::{Controller, LinkError};
use crate::settings::Settings;
use crate::state::{Detail, Mode};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("malformed key=value pair: {0}")]
    BadPair(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid integer for {0}: {1}")]
    BadInt(&'static str, String),
    #[error("invalid value for {0}: {1}")]
    BadEnum(&'static str, String),
    #[error("unknown command: {0}")]
    UnknownTag(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Start(Round),
    Score,
    Stop,
    Reset,
    Status,
    Quit,
}

pub const HELP: &str = "\
commands:
  TARGET [detail=off|ab|cd]
  MATCHPLAY side=left|right
  EQUIP FAIL arrows=N [per_arrow=SECS]
  SCORE | STOP | RESET | STATUS | QUIT";

pub fn parse_command(line: &str) -> Result<OperatorCommand, ParseError> {
    let s = line.trim_matches(|c| c == '\r' || c == '\n' || c == ' ');
    if s.is_empty() {
        return Err(ParseError::Empty);
    }

    // Everything before the first k=v is the (possibly multi-word) tag.
    let tokens: Vec<&str> = s.split_whitespace().collect();
    let kv_start = tokens
        .iter()
        .position(|t| t.contains('='))
        .unwrap_or(tokens.len());
    let tag = tokens[..kv_start].join(" ").to_ascii_uppercase();
    let mut map = BTreeMap::<String, String>::new();

    for &tok in &tokens[kv_start..] {
        let (k, v) = tok
            .split_once('=')
            .ok_or_else(|| ParseError::BadPair(tok.to_string()))?;
        if k.is_empty() || v.is_empty() {
            return Err(ParseError::BadPair(tok.to_string()));
        }
        map.insert(k.to_string(), v.to_string());
    }

    use OperatorCommand::*;

    match tag.as_str() {
        "TARGET" => Ok(Start(Round::Target {
            detail: opt_enum(&map, "detail")?.unwrap_or(Detail::AB),
        })),
        "MATCHPLAY" => Ok(Start(Round::Matchplay {
            side: req_enum(&map, "side")?,
        })),
        "EQUIP FAIL" => Ok(Start(Round::EquipFail {
            arrows: req_u16(&map, "arrows")?,
            per_arrow: opt_u16(&map, "per_arrow")?,
        })),
        "SCORE" => Ok(Score),
        "STOP" => Ok(Stop),
        "RESET" => Ok(Reset),
        "STATUS" => Ok(Status),
        "QUIT" | "EXIT" => Ok(Quit),
        _ => Err(ParseError::UnknownTag(tag)),
    }
}

/* ---------- helpers ---------- */

fn opt_u16(map: &BTreeMap<String, String>, k: &'static str) -> Result<Option<u16>, ParseError> {
    map.get(k)
        .map(|v| v.parse::<u16>().map_err(|_| ParseError::BadInt(k, v.clone())))
        .transpose()
}
fn req_u16(map: &BTreeMap<String, String>, k: &'static str) -> Result<u16, ParseError> {
    opt_u16(map, k)?.ok_or(ParseError::MissingField(k))
}
fn opt_enum<T: FromStr>(
    map: &BTreeMap<String, String>,
    k: &'static str,
) -> Result<Option<T>, ParseError> {
    map.get(k)
        .map(|v| T::from_str(v).map_err(|_| ParseError::BadEnum(k, v.clone())))
        .transpose()
}
fn req_enum<T: FromStr>(map: &BTreeMap<String, String>, k: &'static str) -> Result<T, ParseError> {
    opt_enum(map, k)?.ok_or(ParseError::MissingField(k))
}

impl FromStr for Side {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Side::Left),
            "right" | "r" => Ok(Side::Right),
            _ => Err(()),
        }
    }
}

/* ---------- interactive loop ---------- */

struct Running {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

pub struct Console<W: Write + Send + 'static> {
    ctl: Arc<Controller<W>>,
    settings: Settings,
    tick: Duration,
    running: Option<Running>,
}

impl<W: Write + Send + 'static> Console<W> {
    pub fn new(ctl: Arc<Controller<W>>, settings: Settings, tick: Duration) -> Self {
        Self {
            ctl,
            settings,
            tick,
            running: None,
        }
    }

    /// Read commands until QUIT or end of input.
    pub fn run<R: BufRead, O: Write>(&mut self, input: R, mut out: O) -> Result<()> {
        writeln!(out, "{HELP}")?;
        for line in input.lines() {
            let line = line?;
            let cmd = match parse_command(&line) {
                Ok(cmd) => cmd,
                Err(ParseError::Empty) => continue,
                Err(e) => {
                    writeln!(out, "? {e}")?;
                    continue;
                }
            };
            if !self.handle(cmd, &mut out)? {
                break;
            }
        }
        self.finish_round();
        Ok(())
    }

    /// Execute one command. Returns `false` when the console should exit.
    pub fn handle<O: Write>(&mut self, cmd: OperatorCommand, out: &mut O) -> Result<bool> {
        match cmd {
            OperatorCommand::Stop => {
                // Not routed through the running round: the stop must go out now.
                let sent = self.ctl.emergency_stop();
                self.finish_round();
                match sent {
                    Ok(state) => writeln!(out, "EMERGENCY STOP {state}")?,
                    Err(e) => report(out, "emergency stop not sent", e)?,
                }
            }
            OperatorCommand::Reset => match self.ctl.clear_emergency_stop() {
                Ok(state) => writeln!(out, "reset {state}")?,
                Err(e) => report(out, "reset", e)?,
            },
            OperatorCommand::Score => {
                self.finish_round();
                match self.ctl.apply(rounds::score_command(&self.settings)) {
                    Ok(state) => writeln!(out, "score {state}")?,
                    Err(e) => report(out, "score", e)?,
                }
            }
            OperatorCommand::Status => {
                let state = self.ctl.snapshot()?;
                let round = if self.round_active() { "running" } else { "idle" };
                writeln!(out, "mode={} round={} {}", self.ctl.mode()?, round, state)?;
            }
            OperatorCommand::Start(round) => {
                if self.ctl.is_stopped()? {
                    writeln!(out, "? emergency stop engaged, RESET first")?;
                    return Ok(true);
                }
                let phases = match rounds::plan(round, &self.settings) {
                    Ok(p) => p,
                    Err(e) => {
                        writeln!(out, "? {e}")?;
                        return Ok(true);
                    }
                };
                self.finish_round();
                self.spawn_round(round.mode(), phases)?;
                writeln!(out, "started {round:?}")?;
            }
            OperatorCommand::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn round_active(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    fn spawn_round(&mut self, mode: Mode, phases: Vec<rounds::Phase>) -> Result<()> {
        let cancel = CancelToken::new();
        let seq = Sequencer::new(Arc::clone(&self.ctl), self.tick, cancel.clone());
        let handle = std::thread::Builder::new()
            .name("round".into())
            .spawn(move || match seq.run(mode, &phases) {
                Ok(RoundOutcome::Completed) => info!(%mode, "round complete"),
                Ok(outcome) => warn!(%mode, ?outcome, "round ended early"),
                Err(e) => error!(%mode, "round failed: {e}"),
            })
            .map_err(|e| anyhow!("spawning round thread: {e}"))?;
        self.running = Some(Running { cancel, handle });
        Ok(())
    }

    fn finish_round(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            if running.handle.join().is_err() {
                error!("round thread panicked");
            }
        }
    }
}

/// Print a failed transition and keep the console alive. Only a poisoned
/// controller ends the session.
fn report<O: Write>(out: &mut O, what: &str, err: LinkError) -> Result<()> {
    match err {
        LinkError::Poisoned => Err(LinkError::Poisoned.into()),
        LinkError::State(e) => Ok(writeln!(out, "? {what}: {e}")?),
        LinkError::Io(e) => {
            error!("{what}: serial write failed: {e}");
            Ok(writeln!(out, "? {what}: {e}")?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{LIMITS, Unplugged, Wire};
    use crate::state::Colour;
    use std::io::Cursor;

    #[test]
    fn parse_round_commands() {
        assert_eq!(
            parse_command("target detail=cd\r\n"),
            Ok(OperatorCommand::Start(Round::Target { detail: Detail::CD }))
        );
        assert_eq!(
            parse_command("TARGET"),
            Ok(OperatorCommand::Start(Round::Target { detail: Detail::AB }))
        );
        assert_eq!(
            parse_command("MATCHPLAY side=right"),
            Ok(OperatorCommand::Start(Round::Matchplay { side: Side::Right }))
        );
        assert_eq!(
            parse_command("equip fail arrows=3 per_arrow=30"),
            Ok(OperatorCommand::Start(Round::EquipFail {
                arrows: 3,
                per_arrow: Some(30)
            }))
        );
        assert_eq!(parse_command("  stop "), Ok(OperatorCommand::Stop));
        assert_eq!(parse_command("Exit"), Ok(OperatorCommand::Quit));
    }

    #[test]
    fn parse_error_cases() {
        assert_eq!(parse_command(""), Err(ParseError::Empty));
        assert!(matches!(
            parse_command("LAUNCH id=1"),
            Err(ParseError::UnknownTag(_))
        ));
        assert_eq!(
            parse_command("MATCHPLAY"),
            Err(ParseError::MissingField("side"))
        );
        assert!(matches!(
            parse_command("EQUIP FAIL arrows=many"),
            Err(ParseError::BadInt("arrows", _))
        ));
        assert!(matches!(
            parse_command("TARGET detail=ef"),
            Err(ParseError::BadEnum("detail", _))
        ));
        assert!(matches!(
            parse_command("TARGET detail="),
            Err(ParseError::BadPair(_))
        ));
    }

    fn console(wire: &Wire) -> Console<Wire> {
        let ctl = Arc::new(Controller::new(wire.clone(), LIMITS));
        Console::new(ctl, Settings::default(), Duration::from_millis(5))
    }

    #[test]
    fn stop_then_reset_session() {
        let wire = Wire::default();
        let mut c = console(&wire);
        let input = Cursor::new("TARGET detail=ab\nSTOP\nTARGET\nRESET\nSCORE\nQUIT\nSTOP\n");
        let mut out = Vec::new();
        c.run(input, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("EMERGENCY STOP"));
        assert!(text.contains("RESET first"));

        let sent = wire.states();
        let stop = sent.iter().position(|s| s.emergency_stop()).unwrap();
        assert_eq!(sent[stop].raw_time(), LIMITS.target);
        // Nothing after QUIT, and the final frame is the score state.
        let last = sent.last().unwrap();
        assert!(!last.emergency_stop());
        assert_eq!(last.colour(), Colour::Red);
        assert_eq!(last.remaining_time(), Some(240));
        assert_eq!(sent.iter().filter(|s| s.emergency_stop()).count(), 1);
    }

    #[test]
    fn bad_lines_are_reported_not_fatal() {
        let wire = Wire::default();
        let mut c = console(&wire);
        let mut out = Vec::new();
        c.run(Cursor::new("\nFLY\nSTATUS\n"), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("? unknown command: FLY"));
        assert!(text.contains("mode=target round=idle"));
        assert!(wire.states().is_empty());
    }

    #[test]
    fn send_failure_keeps_console_running() {
        let ctl = Arc::new(Controller::new(Unplugged, LIMITS));
        let tick = Duration::from_millis(5);
        let mut c = Console::new(Arc::clone(&ctl), Settings::default(), tick);
        let mut out = Vec::new();
        c.run(Cursor::new("STOP\nSTATUS\nRESET\nSTATUS\n"), &mut out)
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("? emergency stop not sent: serial write: unplugged"));
        assert!(text.contains("round=idle estop=true"));
        assert!(text.contains("? reset: serial write: unplugged"));
        // The reset applied locally even though it never reached the device.
        assert!(!ctl.is_stopped().unwrap());
    }
}
