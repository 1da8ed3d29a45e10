//! Command-line tool for checking sensor configuration offline.
//!
//! Reads a sensor section as JSON and shows what a session would send to
//! the MCU, or decodes raw samples captured from it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use spi_temperature::{
    bounds::compute_bounds,
    chip::RawSample,
    config::SensorSection,
    mcu::RecordingMcu,
    registry, tracing,
};

/// Default MCU clock used when none is given.
const DEFAULT_MCU_FREQ: f64 = 16_000_000.0;

/// Inspect SPI temperature sensor configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the configuration commands sent to the MCU
    Commands {
        /// Sensor section as JSON
        section: PathBuf,

        #[arg(long, default_value_t = 0.0)]
        min_temp: f64,

        #[arg(long, default_value_t = 300.0)]
        max_temp: f64,

        /// MCU clock frequency in Hz
        #[arg(long, default_value_t = DEFAULT_MCU_FREQ)]
        mcu_freq: f64,
    },

    /// Decode a raw sample
    Decode {
        section: PathBuf,

        /// Raw value, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_u32)]
        value: u32,

        /// Fault status byte, for chips that report one
        #[arg(short, long, default_value = "0", value_parser = parse_u8)]
        fault: u8,
    },

    /// Print the raw ADC limits for a temperature range
    Bounds {
        section: PathBuf,

        #[arg(allow_negative_numbers = true)]
        min_temp: f64,

        #[arg(allow_negative_numbers = true)]
        max_temp: f64,
    },
}

fn main() -> Result<()> {
    tracing::init_journald_or_stdout();

    let args = Args::parse();
    match args.command {
        Cmd::Commands {
            section,
            min_temp,
            max_temp,
            mcu_freq,
        } => cmd_commands(&section, min_temp, max_temp, mcu_freq),
        Cmd::Decode {
            section,
            value,
            fault,
        } => cmd_decode(&section, value, fault),
        Cmd::Bounds {
            section,
            min_temp,
            max_temp,
        } => cmd_bounds(&section, min_temp, max_temp),
    }
}

fn load_section(path: &Path) -> Result<SensorSection> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read sensor section: {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid sensor section: {:?}", path))
}

fn cmd_commands(path: &Path, min_temp: f64, max_temp: f64, mcu_freq: f64) -> Result<()> {
    if !(mcu_freq > 0.0) {
        bail!("MCU frequency must be positive, got {}", mcu_freq);
    }
    let section = load_section(path)?;
    let mut mcu = RecordingMcu::new(mcu_freq);

    let mut session = registry::create_sensor(&section, &mut mcu)?;
    session.setup_minmax(min_temp, max_temp)?;
    session.build_config(&mut mcu)?;

    for cmd in mcu.command_texts() {
        println!("{}", cmd);
    }
    Ok(())
}

fn cmd_decode(path: &Path, value: u32, fault: u8) -> Result<()> {
    let section = load_section(path)?;
    let chip = section.chip(section.chip_kind()?)?;

    match chip.decode(RawSample::new(value, fault)) {
        Ok(temp) => println!("{:.4} degC", temp),
        Err(fault) => println!("FAULT: {}", fault),
    }
    Ok(())
}

fn cmd_bounds(path: &Path, min_temp: f64, max_temp: f64) -> Result<()> {
    let section = load_section(path)?;
    let chip = section.chip(section.chip_kind()?)?;
    let bounds = compute_bounds(&chip, min_temp, max_temp)?;

    // Hex shows the 32-bit word the MCU compares against
    println!("min_value={} ({:#010x})", bounds.min, bounds.min as u32);
    println!("max_value={} ({:#010x})", bounds.max, bounds.max as u32);
    Ok(())
}

fn parse_u32(s: &str) -> Result<u32, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("invalid value '{}': {}", s, e))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let value = parse_u32(s)?;
    u8::try_from(value).map_err(|_| format!("fault byte out of range: {}", s))
}
