use anyhow::{Context, Result};
use std::io::{ErrorKind, Read};

use crate::cli::{DecodeOpts, MonitorOpts};
use crate::frame::{FrameParser, parse_frame};
use crate::port::open_port;
use crate::session::hex;
use crate::state::LinkState;
use crate::stats::Stats;

pub fn run(opts: MonitorOpts) -> Result<()> {
    tracing::debug!(?opts, "monitor");
    let mut stats = Stats::new();
    match &opts.input {
        Some(path) => {
            let file =
                std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
            watch(file, &mut stats, &opts, |s| println!("{s}"))?;
        }
        None => {
            let port = open_port(&opts.ser)?;
            tracing::info!("starting receive loop");
            watch(port, &mut stats, &opts, |s| println!("{s}"))?;
        }
    }
    tracing::info!("[monitor] {}", stats.summary());
    Ok(())
}

/// Validate a frame given as hex and print what it carries.
pub fn decode(opts: DecodeOpts) -> Result<()> {
    let bytes = parse_hex(&opts.hex.join(""))?;
    let payload = parse_frame(&bytes).context("frame rejected")?;
    let state = LinkState::from_payload(payload).context("payload rejected")?;
    println!("{state}");
    Ok(())
}

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != ',')
        .collect();
    if !digits.is_ascii() {
        anyhow::bail!("bad hex");
    }
    if digits.len() % 2 != 0 {
        anyhow::bail!("odd hex length");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).context("bad hex"))
        .collect()
}

/// Decode frames from `reader` until end of input or `opts.frames` good frames.
/// Read timeouts are idle time, not errors.
pub fn watch<R: Read, F: FnMut(&LinkState)>(
    mut reader: R,
    stats: &mut Stats,
    opts: &MonitorOpts,
    mut on_state: F,
) -> Result<()> {
    let mut parser = FrameParser::new();
    let mut chunk = [0u8; 64];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                stats.maybe_print(opts.stats);
                continue;
            }
            Err(e) => return Err(e).context("serial read"),
        };
        stats.add_bytes(n);

        for &b in &chunk[..n] {
            match parser.feed(b) {
                Ok(None) => {}
                Ok(Some(payload)) => match LinkState::from_payload(&payload) {
                    Ok(state) => {
                        stats.inc_ok();
                        if state.emergency_stop() {
                            stats.inc_estop();
                        }
                        on_state(&state);
                        if opts.frames.is_some_and(|max| stats.ok >= max) {
                            return Ok(());
                        }
                    }
                    Err(err) => {
                        stats.inc_bad();
                        if opts.debug {
                            tracing::warn!("[BAD ] {} payload=\"{}\"", err, hex(&payload));
                        }
                    }
                },
                Err(err) => {
                    stats.inc_bad();
                    if opts.debug {
                        tracing::warn!("[BAD ] {}", err);
                    }
                }
            }
        }
        stats.maybe_print(opts.stats);
    }
    Ok(())
}
