use criterion::{criterion_group, criterion_main, Criterion};

use mlx90640_acquire::{
    AcquisitionConfig, AcquisitionSession, CalibrationProvider, Conversion, LibraryError,
    RawSubpage, EEPROM_WORDS, NUM_PIXELS,
};
use mlx90640_acquire_test_data::{MockDelay, MockSensorBus, ScriptedSubpage};

struct FixedAmbient;

impl CalibrationProvider for FixedAmbient {
    type Parameters = f32;

    fn extract_parameters(&self, eeprom: &[u16; EEPROM_WORDS]) -> Result<f32, LibraryError> {
        Ok(f32::from(eeprom[0]))
    }

    fn ambient_temperature(&self, _raw: &RawSubpage, _parameters: &f32) -> f32 {
        25.0
    }
}

struct Scaled;

impl Conversion<f32> for Scaled {
    fn to_temperatures(
        &self,
        raw: &RawSubpage,
        divisor: &f32,
        _emissivity: f32,
        _ambient_temperature: f32,
        destination: &mut [f32; NUM_PIXELS],
    ) {
        for (temperature, raw) in destination.iter_mut().zip(raw.pixels()) {
            *temperature = f32::from(*raw) / divisor;
        }
    }
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let address = 0x33;
    let mut mocked = MockSensorBus::new(address);
    mocked.fill_eeprom(100);
    mocked.extend_script([ScriptedSubpage::ready(0, 1000), ScriptedSubpage::ready(1, 2000)]);
    mocked.set_repeat_script(true);
    let mut session = AcquisitionSession::new(
        &mut mocked,
        address,
        MockDelay::new(),
        FixedAmbient,
        Scaled,
        AcquisitionConfig::default(),
    )
    .unwrap();

    let mut group = c.benchmark_group("Frame Acquisition");
    group.bench_function("in sequence", |b| {
        b.iter(|| session.acquire_frame().unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
