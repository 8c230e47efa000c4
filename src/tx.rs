use anyhow::{Context, Result};
use std::io::{self, BufRead};
use std::sync::Arc;

use crate::cli::{ConsoleOpts, RoundKind, RoundOpts, SendOpts, StopOpts, parse_flag, tick};
use crate::console::Console;
use crate::port::open_port;
use crate::rounds::{self, CancelToken, Round, RoundOutcome, Sequencer, Side};
use crate::session::Controller;
use crate::settings::Settings;
use crate::state::{Colour, Detail, Mode, StateCommand};

pub fn send(opts: SendOpts, settings: &Settings) -> Result<()> {
    let cmd = StateCommand {
        countdown_continues: opts.continues,
        last_end: opts.last_end,
        matchplay: opts.matchplay,
        countdown: opts.countdown,
        detail: parse_flag::<Detail>("detail", &opts.detail)?,
        colour: parse_flag::<Colour>("colour", &opts.colour)?,
        time_enabled: opts.time.is_some(),
        time: opts.time.unwrap_or(0),
        start_beeps: opts.start_beeps,
        end_beeps: opts.end_beeps,
    };
    let ctl = Controller::new(open_port(&opts.ser)?, settings.limits());
    let state = ctl.apply(cmd).context("sending state")?;
    println!("{state}");
    Ok(())
}

pub fn stop(opts: StopOpts, settings: &Settings) -> Result<()> {
    let mode = parse_flag::<Mode>("mode", &opts.mode)?;
    let ctl = Controller::new(open_port(&opts.ser)?, settings.limits());
    ctl.set_mode(mode)?;
    let state = ctl.emergency_stop().context("sending emergency stop")?;
    println!("{state}");
    Ok(())
}

pub fn round(opts: RoundOpts, settings: &Settings) -> Result<()> {
    let round = match &opts.kind {
        RoundKind::Target { detail } => Round::Target {
            detail: parse_flag("detail", detail)?,
        },
        RoundKind::Matchplay { side } => Round::Matchplay {
            side: parse_flag::<Side>("side", side)?,
        },
        RoundKind::EquipFail { arrows, per_arrow } => Round::EquipFail {
            arrows: *arrows,
            per_arrow: *per_arrow,
        },
    };
    let phases = rounds::plan(round, settings)?;
    let ctl = Arc::new(Controller::new(open_port(&opts.ser)?, settings.limits()));

    // Detached: exits with the process.
    let watcher = Arc::clone(&ctl);
    std::thread::Builder::new()
        .name("stop-watcher".into())
        .spawn(move || {
            eprintln!("press Enter (or type stop) for EMERGENCY STOP");
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let word = line.trim();
                if word.is_empty() || word.eq_ignore_ascii_case("stop") {
                    if let Err(e) = watcher.emergency_stop() {
                        tracing::error!("emergency stop failed to send: {e}");
                    }
                    break;
                }
            }
        })
        .context("spawning stop watcher")?;

    let seq = Sequencer::new(Arc::clone(&ctl), tick(opts.tick_ms), CancelToken::new());
    let outcome = seq.run(round.mode(), &phases)?;
    match outcome {
        RoundOutcome::Completed => println!("round complete"),
        other => println!("round ended: {other:?} ({})", ctl.snapshot()?),
    }
    Ok(())
}

pub fn console(opts: ConsoleOpts, settings: Settings) -> Result<()> {
    let ctl = Arc::new(Controller::new(open_port(&opts.ser)?, settings.limits()));
    let mut console = Console::new(ctl, settings, tick(opts.tick_ms));
    console.run(io::stdin().lock(), io::stdout())
}
