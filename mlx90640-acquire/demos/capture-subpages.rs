use std::convert::TryFrom;
use std::env;
use std::path::Path;

use anyhow::bail;
use linux_embedded_hal::{Delay, I2cdev};

use mlx90640_acquire::{
    AcquisitionConfig, AcquisitionSession, CalibrationProvider, Conversion, FrameRate,
    LibraryError, RawSubpage, EEPROM_WORDS, NUM_PIXELS, WIDTH,
};

/// No calibration at all, just enough to get raw readings through the acquisition.
struct Uncalibrated;

impl CalibrationProvider for Uncalibrated {
    type Parameters = ();

    fn extract_parameters(&self, _eeprom: &[u16; EEPROM_WORDS]) -> Result<(), LibraryError> {
        Ok(())
    }

    fn ambient_temperature(&self, _raw: &RawSubpage, _parameters: &()) -> f32 {
        0.0
    }
}

/// Pass the raw pixel readings (signed 16-bit ADC counts) through untouched.
struct RawCounts;

impl Conversion<()> for RawCounts {
    fn to_temperatures(
        &self,
        raw: &RawSubpage,
        _parameters: &(),
        _emissivity: f32,
        _ambient_temperature: f32,
        destination: &mut [f32; NUM_PIXELS],
    ) {
        for (count, raw) in destination.iter_mut().zip(raw.pixels()) {
            *count = f32::from(*raw as i16);
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        bail!("Two arguments required: <I2C bus> <camera address> [frame rate]");
    }
    let address: u8 = if args[2].starts_with("0x") {
        let hex_digits = args[2].split_at(2).1;
        u8::from_str_radix(hex_digits, 16)?
    } else {
        args[2].parse()?
    };
    let mut config = AcquisitionConfig::default();
    if let Some(frame_rate) = args.get(3) {
        let frame_rate: f32 = frame_rate.parse()?;
        config = config.with_frame_rate(FrameRate::try_from(frame_rate)?);
    }
    let bus_path = Path::new(&args[1]);
    let mut bus = I2cdev::new(bus_path)?;
    let mut session =
        AcquisitionSession::new(&mut bus, address, Delay, Uncalibrated, RawCounts, config)?;
    let frame = session.acquire_frame()?;
    print_counts(frame.pixels(), WIDTH);
    println!();
    let summary = frame.summary();
    println!(
        "Frame: min={:.0} max={:.0} avg={:.1}",
        summary.min, summary.max, summary.mean
    );
    let stats = frame.stats();
    println!(
        "{} status polls, {} sequencing retries, {} overruns",
        stats.status_polls, stats.sequencing_retries, stats.overruns
    );
    Ok(())
}

fn print_counts(counts: &[f32], width: usize) {
    for (index, count) in counts.iter().enumerate() {
        if index % width == 0 {
            println!();
        }
        print!("{:6.0} ", count);
    }
}
