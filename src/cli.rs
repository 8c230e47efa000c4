use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "range-link",
    about = "Serial controller for the archery field timer (lights, detail, countdown)"
)]
pub struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
    /// Settings file
    #[arg(long, global = true, default_value = "range-link.json")]
    pub config: PathBuf,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Send one state frame
    Send(SendOpts),
    /// Send the emergency stop
    Stop(StopOpts),
    /// Run a round; Enter or "stop" on stdin triggers emergency stop
    Round(RoundOpts),
    /// Interactive operator console
    Console(ConsoleOpts),
    /// Decode frames from a port or capture file
    Monitor(MonitorOpts),
    /// Check and decode one hex frame
    Decode(DecodeOpts),
    /// Show or change persisted settings
    Settings(SettingsOpts),
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Serial device path
    #[arg(long, default_value = "/dev/ttyUSB0")]
    pub dev: String,
    /// Baud rate
    #[arg(long, default_value_t = 9_600)]
    pub baud: u32,
}

#[derive(Args, Debug, Clone)]
pub struct SendOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// red, amber or green
    #[arg(long, default_value = "red")]
    pub colour: String,
    /// off, ab or cd
    #[arg(long, default_value = "off")]
    pub detail: String,
    /// Time to show; enables the numeric display
    #[arg(long)]
    pub time: Option<i16>,
    /// Let the device count down
    #[arg(long, default_value_t = false)]
    pub countdown: bool,
    /// Another countdown follows this one
    #[arg(long, default_value_t = false)]
    pub continues: bool,
    #[arg(long, default_value_t = false)]
    pub matchplay: bool,
    #[arg(long, default_value_t = false)]
    pub last_end: bool,
    #[arg(long, default_value_t = 0)]
    pub start_beeps: i16,
    #[arg(long, default_value_t = 0)]
    pub end_beeps: i16,
}

#[derive(Args, Debug, Clone)]
pub struct StopOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Mode whose maximum time is shown: target or matchplay
    #[arg(long, default_value = "target")]
    pub mode: String,
}

#[derive(Args, Debug, Clone)]
pub struct RoundOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Local clock tick in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub tick_ms: u64,
    #[command(subcommand)]
    pub kind: RoundKind,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RoundKind {
    /// Walk-up then a full target end
    Target {
        #[arg(long, default_value = "ab")]
        detail: String,
    },
    /// One matchplay end for one side
    Matchplay {
        /// left (A/B) or right (C/D)
        #[arg(long)]
        side: String,
    },
    /// Make-up time after an equipment failure
    EquipFail {
        #[arg(long)]
        arrows: u16,
        /// Seconds per arrow (defaults to the equip_fail_time setting)
        #[arg(long)]
        per_arrow: Option<u16>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ConsoleOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    #[arg(long, default_value_t = 1000)]
    pub tick_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct MonitorOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Read a capture file instead of the port
    #[arg(long)]
    pub input: Option<PathBuf>,
    /// Exit after this many good frames
    #[arg(long)]
    pub frames: Option<u64>,
    /// Print each BAD frame
    #[arg(long, default_value_t = false)]
    pub debug: bool,
    /// Stats print interval in seconds
    #[arg(long, default_value_t = 1.0)]
    pub stats: f64,
}

#[derive(Args, Debug, Clone)]
pub struct DecodeOpts {
    /// Frame bytes in hex, spaces allowed
    #[arg(required = true, num_args = 1..)]
    pub hex: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SettingsOpts {
    #[command(subcommand)]
    pub action: SettingsAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsAction {
    /// Print the current settings as JSON
    Show,
    /// Update settings, e.g. `set target_max_time=180`
    Set {
        #[arg(required = true, num_args = 1..)]
        pairs: Vec<String>,
    },
}

/// Parse a named value from a CLI string, naming the flag in the error.
pub fn parse_flag<T: FromStr>(flag: &str, value: &str) -> anyhow::Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("invalid --{flag}: {value}"))
}

pub fn tick(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Colour, Mode};

    #[test]
    fn parses_round_invocation() {
        let cli = Cli::try_parse_from([
            "range-link",
            "round",
            "--dev",
            "/dev/ttyACM0",
            "matchplay",
            "--side",
            "left",
        ])
        .unwrap();
        match cli.cmd {
            Cmd::Round(opts) => {
                assert_eq!(opts.ser.dev, "/dev/ttyACM0");
                assert_eq!(opts.ser.baud, 9600);
                assert_eq!(opts.tick_ms, 1000);
                assert!(matches!(opts.kind, RoundKind::Matchplay { ref side } if side == "left"));
            }
            other => panic!("wrong command {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["range-link", "stop", "-v", "--config", "x.json"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("x.json"));
    }

    #[test]
    fn flag_values() {
        assert_eq!(parse_flag::<Colour>("colour", "Amber").unwrap(), Colour::Amber);
        assert_eq!(parse_flag::<Mode>("mode", "target").unwrap(), Mode::Target);
        let err = parse_flag::<Colour>("colour", "pink").unwrap_err();
        assert_eq!(err.to_string(), "invalid --colour: pink");
        assert_eq!(tick(0), Duration::from_millis(1));
    }
}
