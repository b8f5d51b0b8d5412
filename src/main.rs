use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use tracing::{Level, info};

use archie_kbd::machine::archie::{ArchieKeyboard, Controller, LinkConfig, ModeFlags};
use archie_kbd::machine::generic::link::ChannelTransport;
use archie_kbd::machine::generic::timer::SystemClock;

mod host;

use crate::host::logging::{setup_logging_file, setup_logging_stdio};
use crate::host::script::ScriptEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    None,
    Scan,
    Mouse,
    Both,
}

impl From<Mode> for ModeFlags {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::None => ModeFlags::new(false, false),
            Mode::Scan => ModeFlags::new(true, false),
            Mode::Mouse => ModeFlags::new(false, true),
            Mode::Both => ModeFlags::new(true, true),
        }
    }
}

/// Archimedes keyboard link
/// Runs the keyboard end of the link against a simulated controller
#[derive(Parser)]
#[command(name = "archie-kbd")]
#[command(about = "Drive an Archimedes keyboard link against a simulated controller")]
struct Args {
    /// How long to run the session, in milliseconds
    #[arg(long, default_value_t = 200)]
    duration_ms: u64,

    /// Input to send once the link is up, repeatable:
    /// down:<hex>, up:<hex>, key:<hex>, mouse:<dx>,<dy>, buttons:<mask>
    #[arg(long = "event", value_name = "EVENT")]
    events: Vec<ScriptEvent>,

    /// Scan/mouse mode the controller grants
    #[arg(long, value_enum, default_value_t = Mode::Both)]
    mode: Mode,

    /// Controller ignores every Nth data byte
    #[arg(long, value_name = "N")]
    drop_every: Option<u32>,

    /// Acknowledgment timeout, in milliseconds
    #[arg(long, default_value_t = 10)]
    ack_timeout_ms: u64,

    /// Handshake step timeout, in milliseconds
    #[arg(long, default_value_t = 20)]
    handshake_timeout_ms: u64,

    /// Quiet period after each acknowledgment, in milliseconds
    #[arg(long)]
    hold_off_ms: Option<u64>,

    /// Write the log to a file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn link_config(&self) -> LinkConfig {
        LinkConfig {
            ack_timeout_ms: self.ack_timeout_ms,
            handshake_timeout_ms: self.handshake_timeout_ms,
            hold_off_ms: self.hold_off_ms,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let level = if args.verbose {
        Level::TRACE
    } else {
        Level::INFO
    };
    match &args.log_file {
        Some(path) => setup_logging_file(level, path)?,
        None => setup_logging_stdio(level),
    }

    let config = args.link_config();
    info!("Link config: {config:?}");

    let (kbd_end, ctrl_end) = ChannelTransport::pair("kbd", "ioc");
    let mut kbd = ArchieKeyboard::new(kbd_end, SystemClock::default(), config);
    let mut ctrl = Controller::new(ctrl_end, args.mode.into());
    if let Some(n) = args.drop_every {
        ctrl = ctrl.with_drop_every(n);
    }
    ctrl.start();

    let start = Instant::now();
    let duration = Duration::from_millis(args.duration_ms);
    let mut pending = Some(args.events.clone());
    let mut buttons = 0;
    while start.elapsed() < duration {
        ctrl.tick();
        kbd.poll();

        if ctrl.is_ready() {
            if let Some(events) = pending.take() {
                for event in events {
                    info!("Host {event:?}");
                    event.apply(&mut kbd, &mut buttons);
                }
            }
        }

        for message in ctrl.take_messages() {
            info!("Received {message:?}");
        }
        thread::sleep(Duration::from_millis(1));
    }
    ctrl.tick();
    for message in ctrl.take_messages() {
        info!("Received {message:?}");
    }

    let stats = kbd.stats();
    info!("Session completed in {:?}:", start.elapsed());
    info!("  Final state: {:?}, mode {:?}", kbd.state(), kbd.mode());
    info!("  Bytes sent/received: {}/{}", stats.bytes_sent, stats.bytes_received);
    info!("  Queue overflows: {}", stats.queue_overflows);
    info!("  Ack timeouts: {}", stats.ack_timeouts);
    info!("  Handshake timeouts: {}", stats.handshake_timeouts);
    info!("  Protocol violations: {}", stats.protocol_violations);
    info!("  Resets: {}", stats.resets);
    if pending.is_some() {
        info!("  Link never came up, scripted events not sent");
    }

    Ok(())
}
