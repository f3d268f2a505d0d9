//! Cougar Terminal Utility
//!
//! Host-side companion for the Cougar soft processor, which boots over its
//! UART. The utility is a pass-through terminal for the processor's output
//! that also answers the two requests the processor can make:
//!
//! - **Program load**: on a `Load program` line, ask for a binary and stream
//!   it to the device, closed by the configured terminator
//! - **Breakpoint**: on a `Breakpoint` line, ask whether to dump or continue
//!   and send the matching command byte(s)
//!
//! # Usage
//!
//! ```bash
//! # List available serial ports
//! cougar-term serial list
//!
//! # Open a session, choosing port and baud interactively
//! cougar-term serial run
//!
//! # Open a session on a known port, speaking the IMDONE protocol revision
//! cougar-term serial run -p /dev/ttyUSB1 -b 115200 --terminator im-done
//!
//! # Inspect an image before sending it
//! cougar-term image inspect build/prime.bin
//! ```

mod error;
mod image;
mod protocol;
mod serial;
mod session;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use image::ProgramImage;
use protocol::{Pacing, ProtocolConfig, Terminator};

#[cfg(feature = "serial")]
use serial::{PortConfig, SerialConnection};
#[cfg(feature = "serial")]
use session::{ConsoleOperator, Session, Transcript};

/// Cougar Terminal Utility
///
/// UART terminal and program loader for the Cougar soft processor
#[derive(Parser)]
#[command(name = "cougar-term")]
#[command(author = "Prasanna Gautam")]
#[command(version = "0.1.0")]
#[command(about = "UART terminal and program loader for the Cougar soft processor")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serial port operations
    #[cfg(feature = "serial")]
    #[command(subcommand)]
    Serial(SerialCommands),

    /// Program image operations
    #[command(subcommand)]
    Image(ImageCommands),
}

#[cfg(feature = "serial")]
#[derive(Subcommand)]
enum SerialCommands {
    /// List available serial ports
    List,

    /// Run a terminal session with the device
    Run {
        /// Serial port path (prompted from a list when omitted)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate (prompted when omitted)
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        baud: Option<u32>,

        /// Read timeout in milliseconds
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,

        /// Write a timestamped session transcript to this file
        #[arg(short, long)]
        log: Option<PathBuf>,

        #[command(flatten)]
        protocol: ProtocolArgs,
    },
}

#[derive(Subcommand)]
enum ImageCommands {
    /// Show size, checksum and transfer estimate for a program image
    Inspect {
        /// Path to the program binary
        path: PathBuf,

        /// Number of leading bytes to hex dump
        #[arg(long, default_value_t = 64)]
        preview: usize,

        #[command(flatten)]
        protocol: ProtocolArgs,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PacingMode {
    /// One byte at a time with a fixed delay
    Fixed,
    /// Back-to-back bulk writes
    #[value(name = "none")]
    Unpaced,
}

/// Protocol revision options shared by the subcommands
#[derive(Args, Debug, Clone)]
struct ProtocolArgs {
    /// End-of-image marker the device firmware expects
    #[arg(long, value_enum, default_value_t = Terminator::FourFF)]
    terminator: Terminator,

    /// Byte pacing during program transfer
    #[arg(long, value_enum, default_value_t = PacingMode::Fixed)]
    pacing: PacingMode,

    /// Delay after each byte with fixed pacing, in milliseconds
    #[arg(long, default_value_t = 20)]
    pace_ms: u64,

    /// Wait before draining stale input ahead of a transfer, in milliseconds
    #[arg(long, default_value_t = 100)]
    settle_ms: u64,
}

impl ProtocolArgs {
    fn to_config(&self) -> ProtocolConfig {
        let pacing = match self.pacing {
            PacingMode::Fixed => Pacing::Fixed(Duration::from_millis(self.pace_ms)),
            PacingMode::Unpaced => Pacing::None,
        };
        ProtocolConfig::new()
            .with_terminator(self.terminator)
            .with_pacing(pacing)
            .with_settle_delay(Duration::from_millis(self.settle_ms))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        #[cfg(feature = "serial")]
        Commands::Serial(cmd) => handle_serial(cmd),
        Commands::Image(cmd) => handle_image(cmd),
    }
}

#[cfg(feature = "serial")]
fn handle_serial(cmd: SerialCommands) -> Result<()> {
    match cmd {
        SerialCommands::List => {
            serial::port::print_ports()?;
            Ok(())
        }

        SerialCommands::Run {
            port,
            baud,
            timeout_ms,
            log,
            protocol,
        } => {
            println!("{}", "Cougar Terminal Utility".cyan().bold());

            let port_path = match port {
                Some(p) => p,
                None => {
                    let ports = serial::port::list_ports()?;
                    if ports.is_empty() {
                        anyhow::bail!("No serial ports found. Connect the board or use -p");
                    }
                    serial::port::print_port_choices(&ports);
                    let index = session::operator::prompt_port_selection(ports.len())?;
                    ports[index].path.clone()
                }
            };

            let baud_rate = match baud {
                Some(b) => b,
                None => session::operator::prompt_baud_rate()?,
            };

            let port_config = PortConfig::new(&port_path)
                .with_baud_rate(baud_rate)
                .with_timeout(Duration::from_millis(timeout_ms));
            let conn = SerialConnection::open(port_config)?;

            println!(
                "{} Connected to {} at {} baud.",
                "[OK]".green().bold(),
                conn.config().port_path.white().bold(),
                conn.config().baud_rate
            );

            let protocol = protocol.to_config();
            println!(
                "{} Transfer protocol: {}, terminator {}",
                "[*]".cyan().bold(),
                protocol.pacing,
                protocol.terminator
            );

            let mut session = Session::new(conn, ConsoleOperator::new(), std::io::stdout(), protocol);
            if let Some(path) = log {
                let transcript = Transcript::create(&path)
                    .with_context(|| format!("Failed to create log file: {}", path.display()))?;
                println!(
                    "{} Logging to: {}",
                    "[LOG]".cyan().bold(),
                    path.display().to_string().white()
                );
                session = session.with_transcript(transcript);
            }

            let err = session.run();
            session.print_summary();
            Err(anyhow::Error::new(err).context("Serial session ended"))
        }
    }
}

fn handle_image(cmd: ImageCommands) -> Result<()> {
    match cmd {
        ImageCommands::Inspect {
            path,
            preview,
            protocol,
        } => {
            let image = ProgramImage::load(&path.to_string_lossy())
                .with_context(|| format!("Failed to load program image: {}", path.display()))?;
            image.print_report(&protocol.to_config(), preview);
        }
    }

    Ok(())
}
