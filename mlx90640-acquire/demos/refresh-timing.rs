use std::convert::TryFrom;
use std::env;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use linux_embedded_hal::{Delay, I2cdev};

use mlx90640_acquire::{
    AcquisitionConfig, AcquisitionSession, CalibrationProvider, Conversion, FrameRate,
    LibraryError, RawSubpage, RetryPolicy, EEPROM_WORDS, NUM_PIXELS,
};

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

struct Discard;

impl Conversion<()> for Discard {
    fn to_temperatures(
        &self,
        _raw: &RawSubpage,
        _parameters: &(),
        _emissivity: f32,
        _ambient_temperature: f32,
        _destination: &mut [f32; NUM_PIXELS],
    ) {
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 || args.len() > 5 {
        bail!("Three arguments required: <I2C bus> <camera address> <frame rate> [num_frames]");
    }
    let address: u8 = if args[2].starts_with("0x") {
        let hex_digits = args[2].split_at(2).1;
        u8::from_str_radix(hex_digits, 16)?
    } else {
        args[2].parse()?
    };
    let frame_rate_num: f32 = args[3].parse()?;
    let frame_rate = FrameRate::try_from(frame_rate_num)?;
    let num_frames: usize = if args.len() < 5 {
        (frame_rate_num * 10f32).max(2f32) as usize
    } else {
        args[4].parse()?
    };
    let bus_path = Path::new(&args[1]);
    let mut bus = I2cdev::new(bus_path)?;
    let config = AcquisitionConfig::default().with_frame_rate(frame_rate);
    let mut session =
        AcquisitionSession::new(&mut bus, address, Delay, Uncalibrated, Discard, config)?;
    let refresh = session
        .refresh_info()
        .context("The refresh rate should have been read back")?;
    let budget = RetryPolicy::for_subpage(&refresh, config.poll_delay_us());
    println!(
        "Subpage period {}s, polling up to {} times every {}µs",
        refresh.subpage_period_s(),
        budget.max_attempts(),
        budget.delay_us()
    );
    println!("Starting measurements.");
    let mut instants = Vec::with_capacity(num_frames);
    let mut retries = 0;
    for _ in 0..num_frames {
        let frame = session.acquire_frame()?;
        instants.push(Instant::now());
        retries += frame.stats().sequencing_retries;
    }
    // Find the duration between each frame, then calculate some statistics on those durations.
    let durations: Vec<Duration> = instants
        .windows(2)
        .map(|pair| pair[1].duration_since(pair[0]))
        .collect();
    let mut sorted_durations = durations.clone();
    sorted_durations.sort();
    let (min, max) = match (sorted_durations.first(), sorted_durations.last()) {
        (Some(min), Some(max)) => (min, max),
        _ => bail!("At least two frames are needed to measure the frame rate"),
    };
    println!(
        "For {}Hz, actual full frame rates (slowest, fastest, mean, median):",
        frame_rate_num
    );
    println!("{}", as_frequency(max));
    println!("{}", as_frequency(min));
    let mean_duration = durations.iter().sum::<Duration>() / durations.len() as u32;
    println!("{}", as_frequency(&mean_duration));
    let middle = sorted_durations.len() / 2;
    let median = if sorted_durations.len() % 2 == 0 {
        (sorted_durations[middle - 1] + sorted_durations[middle]) / 2
    } else {
        sorted_durations[middle]
    };
    println!("{}", as_frequency(&median));
    println!("{} sequencing retries", retries);
    Ok(())
}

fn as_frequency(duration: &Duration) -> f64 {
    duration.as_secs_f64().recip()
}
