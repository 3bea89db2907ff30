// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

// Reliable point-to-point link over RS-232 with a file transfer on top
mod arq;
mod error;
mod frame;
mod handshake;
mod link;
mod packet;
mod protocol;
mod receiver;
mod recognizer;
mod sender;
mod serial;
mod timer;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use error::TransferError;
use link::{Link, LinkConfig, Role};

#[derive(Parser)]
#[command(name = "serlink")]
#[command(about = "Stop-and-wait file transfer over an RS-232 serial line", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyS0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "9600")]
    baud: u32,

    /// Transmissions of one frame before giving up
    #[arg(short, long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
    retries: u32,

    /// Seconds to wait for an answer to each transmission
    #[arg(short, long, default_value = "5", value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file as the transmitter
    Send {
        /// File to send
        file: PathBuf,
    },
    /// Receive a file as the receiver
    Receive {
        /// Directory to save the received file
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    let role = match &cli.command {
        Commands::Send { .. } => Role::Transmitter,
        Commands::Receive { .. } => Role::Receiver,
    };

    let config = LinkConfig {
        port: cli.port,
        role,
        baud_rate: cli.baud,
        max_retries: cli.retries,
        timeout: Duration::from_secs(cli.timeout),
    };

    println!("Opening serial port: {}", config.port);
    println!("Settings: {} baud, 8N1, {} retries, {}s timeout", config.baud_rate, config.max_retries, cli.timeout);

    match cli.command {
        Commands::Send { file } => {
            println!("\nSending file: {}", file.display());
            if let Err(e) = send_file(config, file) {
                eprintln!("Send failed: {}", e);
                std::process::exit(1);
            }
            println!("\nFile sent successfully!");
        }
        Commands::Receive { output_dir } => {
            println!("\nReceiving file to: {}", output_dir.display());
            if let Err(e) = receive_file(config, output_dir) {
                eprintln!("Receive failed: {}", e);
                std::process::exit(1);
            }
            println!("\nFile received successfully!");
        }
    }
}

fn send_file(config: LinkConfig, file: PathBuf) -> Result<(), TransferError> {
    use sender::{SenderFsm, SendStart};

    if !file.is_file() {
        return Err(TransferError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File not found: {}", file.display()),
        )));
    }

    let link = Link::open(config)?;
    let mut state = SenderFsm::<SendStart>::new(link, &file)?;

    loop {
        match state.step() {
            Ok(next_state) => {
                state = next_state;
            }
            Err(TransferError::TransferComplete) => {
                return Ok(());
            }
            Err(e) => {
                return Err(e);
            }
        }
    }
}

fn receive_file(config: LinkConfig, output_dir: PathBuf) -> Result<(), TransferError> {
    use receiver::{ReceiverFsm, WaitStart};

    if !output_dir.is_dir() {
        return Err(TransferError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Output directory not found: {}", output_dir.display()),
        )));
    }

    let link = Link::open(config)?;
    let mut state = ReceiverFsm::<WaitStart>::new(link, output_dir);

    loop {
        match state.step() {
            Ok(next_state) => {
                state = next_state;
            }
            Err(TransferError::TransferComplete) => {
                return Ok(());
            }
            Err(e) => {
                return Err(e);
            }
        }
    }
}
