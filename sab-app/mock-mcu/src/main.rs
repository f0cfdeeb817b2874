mod sim;

use std::{io, path::PathBuf};

use anyhow::{Context, anyhow};
use clap::{Parser, ValueEnum};
use embassy_time::Delay;
use sab_core::utils::{
    BoardConfig, CommandLoop, SystemController,
    config::DwellMode,
    connection::{HandshakeError, server::LoopError, transport::SystemClock},
};
use tracing::info;

use crate::sim::{SimPin, SimPwm, StdioLink};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Profile {
    SingleLed,
    SwitchedLed,
    LedBank,
    ServoLight,
}

impl Profile {
    fn config(self) -> BoardConfig {
        match self {
            Profile::SingleLed => BoardConfig::single_led(),
            Profile::SwitchedLed => BoardConfig::switched_led(),
            Profile::LedBank => BoardConfig::led_bank(),
            Profile::ServoLight => BoardConfig::servo_light(),
        }
    }
}

/// Simulated actuator board speaking the line protocol on stdin/stdout.
#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// board preset
    #[clap(long, value_enum, default_value_t = Profile::LedBank)]
    profile: Profile,
    /// JSON board config, replaces the preset
    #[clap(long)]
    config: Option<PathBuf>,
    /// print the effective config as JSON and exit
    #[clap(long)]
    print_config: bool,
    /// keep servicing the loop during servo dwells
    #[clap(long)]
    polled: bool,
    /// give up after this many lines without READY
    #[clap(long)]
    handshake_attempts: Option<u32>,
}

fn load_config(opts: &Opts) -> anyhow::Result<BoardConfig> {
    let mut config = match &opts.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => opts.profile.config(),
    };
    if opts.polled {
        config.link.dwell = DwellMode::Polled;
    }
    if opts.handshake_attempts.is_some() {
        config.link.handshake_attempts = opts.handshake_attempts;
    }
    config.validate().map_err(|e| anyhow!("invalid board config: {e}"))?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let opts = Opts::parse();
    let config = load_config(&opts)?;
    if opts.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let pins = config.leds.pins.iter().map(|&gpio| SimPin::new(gpio));
    let motor = config.motor.map(|m| SimPwm::new(m.pin));
    let light = config.light.map(|l| SimPwm::new(l.pin));
    let controller = SystemController::attach_from_config(&config, pins, motor, light)
        .map_err(|e| anyhow!("building controller: {e}"))?;

    info!(board = config.name.as_str(), "mock MCU up, send READY on stdin");
    let link = StdioLink::new(io::stdin().lock(), io::stdout());
    let mut command_loop = CommandLoop::new(link, controller, config.link);

    match command_loop.run(&SystemClock, &mut Delay) {
        Ok(never) => match never {},
        Err(LoopError::Transport(e) | LoopError::Handshake(HandshakeError::Transport(e)))
            if e.kind() == io::ErrorKind::UnexpectedEof =>
        {
            info!("input closed, shutting down");
            Ok(())
        }
        Err(e) => Err(anyhow!("{e}")),
    }
}
