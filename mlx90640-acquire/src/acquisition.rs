// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Acquiring full frames: two subpages, converted and merged.
use arrayvec::ArrayVec;
use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::blocking::i2c;
use log::{debug, trace, warn};

use crate::bus::SensorBus;
use crate::calibration::{dump_eeprom, CalibrationProvider, Conversion};
use crate::capture::{CaptureOutcome, RawSubpage, SubpageCapture};
use crate::config::{validate_emissivity, AcquisitionConfig};
use crate::error::{Error, ErrorKind, LibraryError};
use crate::merge::merge_frame;
use crate::mlx90640::{EEPROM_WORDS, HEIGHT, NUM_PIXELS, WIDTH};
use crate::register::{AccessPattern, ControlRegister, FrameRate, Subpage};
use crate::timing::{PollOutcome, RefreshInfo, RetryPolicy};

/// Where an [`AcquisitionSession`] is in acquiring a frame.
///
/// A successful acquisition goes through
/// `Idle → Awaiting(Zero) → Captured(Zero) → Awaiting(One) → Captured(One) → Merging → Done`.
/// Any step can end in `Failed` instead.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AcquisitionState {
    Idle,
    Awaiting(Subpage),
    Captured(Subpage),
    Merging,
    Done,
    Failed(ErrorKind),
}

/// Counters for a single acquisition.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AcquisitionStats {
    /// How many times the camera reported the wrong subpage and was waited on again.
    pub sequencing_retries: u32,

    /// How many of the two captured subpages were flagged as overrun.
    pub overruns: u32,

    /// Status register polls needed for the two captured subpages.
    pub status_polls: u32,
}

/// One complete thermal image.
#[derive(Clone, Debug, PartialEq)]
pub struct FullFrame {
    pixels: [f32; NUM_PIXELS],
    ambient_temperature: f32,
    stats: AcquisitionStats,
}

impl FullFrame {
    /// The temperature of every pixel in degrees Celsius, in row-major order.
    pub fn pixels(&self) -> &[f32; NUM_PIXELS] {
        &self.pixels
    }

    pub fn into_pixels(self) -> [f32; NUM_PIXELS] {
        self.pixels
    }

    /// The temperature of a single pixel, or `None` if the coordinates are out of bounds.
    pub fn pixel(&self, row: usize, column: usize) -> Option<f32> {
        if row < HEIGHT && column < WIDTH {
            Some(self.pixels[row * WIDTH + column])
        } else {
            None
        }
    }

    /// The ambient temperature the frame was converted with.
    pub fn ambient_temperature(&self) -> f32 {
        self.ambient_temperature
    }

    pub fn stats(&self) -> &AcquisitionStats {
        &self.stats
    }

    /// The coldest, hottest and mean pixel temperatures.
    pub fn summary(&self) -> FrameSummary {
        let (min, max, sum) = self.pixels.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY, 0f32),
            |(min, max, sum), pixel| (min.min(*pixel), max.max(*pixel), sum + pixel),
        );
        FrameSummary {
            min,
            max,
            mean: sum / NUM_PIXELS as f32,
        }
    }
}

/// Summary statistics over the pixels of a [`FullFrame`], in degrees Celsius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameSummary {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// Average the finite ambient temperature estimates, if there are any.
fn resolve_ambient(estimates: &[f32]) -> Option<f32> {
    let (sum, count) = estimates
        .iter()
        .filter(|estimate| estimate.is_finite())
        .fold((0f32, 0u8), |(sum, count), estimate| {
            (sum + estimate, count + 1)
        });
    if count == 0 {
        None
    } else {
        Some(sum / f32::from(count))
    }
}

/// The capture attempts left for the current frame.
struct SequencingBudget {
    remaining: u32,
    /// The most recent wrong subpage, and whether it was a duplicate.
    last_mismatch: Option<(Subpage, bool)>,
}

impl SequencingBudget {
    fn exhausted<I2C>(&self, expected: Subpage) -> Error<I2C>
    where
        I2C: i2c::WriteRead + i2c::Write,
    {
        match self.last_mismatch {
            Some((observed, duplicate)) => Error::Sequencing {
                expected,
                observed,
                duplicate,
            },
            None => LibraryError::Other("Sequencing budget exhausted").into(),
        }
    }
}

/// A session with one camera, producing full frames on request.
///
/// The session borrows the I²C bus for its whole lifetime, and owns everything else it needs:
/// the delay, the calibration parameters (extracted once, when the session is created), the
/// conversion, and the buffers for the raw subpages. Creating a new session is the only way to
/// reset the record of which subpage was last consumed.
pub struct AcquisitionSession<'bus, I2C, D, Clb, Conv>
where
    Clb: CalibrationProvider,
{
    bus: SensorBus<'bus, I2C>,
    delay: D,
    calibration: Clb,
    parameters: Clb::Parameters,
    conversion: Conv,
    config: AcquisitionConfig,
    emissivity: f32,
    refresh: Option<RefreshInfo>,
    last_subpage: Option<Subpage>,
    ambient_temperature: Option<f32>,
    state: AcquisitionState,
    capture: SubpageCapture,
    raw: [RawSubpage; 2],
}

impl<'bus, I2C, D, Clb, Conv> AcquisitionSession<'bus, I2C, D, Clb, Conv>
where
    I2C: i2c::WriteRead + i2c::Write,
    D: DelayUs<u32>,
    Clb: CalibrationProvider,
    Conv: Conversion<Clb::Parameters>,
{
    /// Start a session with the camera at `address` on `bus`.
    ///
    /// The EEPROM is read and the calibration parameters extracted from it. If the configuration
    /// requests a frame rate, it is written to the camera and read back to check that it took.
    pub fn new(
        bus: &'bus mut I2C,
        address: u8,
        delay: D,
        calibration: Clb,
        conversion: Conv,
        config: AcquisitionConfig,
    ) -> Result<Self, Error<I2C>> {
        config.validate()?;
        let mut sensor_bus = SensorBus::new(bus, address);
        let mut capture = SubpageCapture::new();
        let mut eeprom = [0u16; EEPROM_WORDS];
        dump_eeprom(&mut sensor_bus, capture.scratch_mut(), &mut eeprom)?;
        let parameters = calibration
            .extract_parameters(&eeprom)
            .map_err(Error::Calibration)?;
        Self::start(
            sensor_bus,
            capture,
            delay,
            calibration,
            parameters,
            conversion,
            config,
        )
    }

    /// Start a session using calibration parameters that have already been extracted.
    ///
    /// The EEPROM is not read.
    pub fn with_parameters(
        bus: &'bus mut I2C,
        address: u8,
        delay: D,
        calibration: Clb,
        parameters: Clb::Parameters,
        conversion: Conv,
        config: AcquisitionConfig,
    ) -> Result<Self, Error<I2C>> {
        config.validate()?;
        Self::start(
            SensorBus::new(bus, address),
            SubpageCapture::new(),
            delay,
            calibration,
            parameters,
            conversion,
            config,
        )
    }

    fn start(
        bus: SensorBus<'bus, I2C>,
        capture: SubpageCapture,
        delay: D,
        calibration: Clb,
        parameters: Clb::Parameters,
        conversion: Conv,
        config: AcquisitionConfig,
    ) -> Result<Self, Error<I2C>> {
        let mut session = Self {
            bus,
            delay,
            calibration,
            parameters,
            conversion,
            config,
            emissivity: config.emissivity(),
            refresh: None,
            last_subpage: None,
            ambient_temperature: None,
            state: AcquisitionState::Idle,
            capture,
            raw: [RawSubpage::new(), RawSubpage::new()],
        };
        if let Some(frame_rate) = config.frame_rate() {
            session.bus.set_frame_rate(frame_rate)?;
        }
        session.refresh_timing()?;
        Ok(session)
    }

    /// Acquire one full frame.
    ///
    /// Both subpages are captured in order (subpage 0, then subpage 1), converted to temperatures
    /// and merged. If anything goes wrong the whole frame is discarded; a partial frame is never
    /// returned.
    pub fn acquire_frame(&mut self) -> Result<FullFrame, Error<I2C>> {
        self.transition(AcquisitionState::Idle);
        match self.run_acquisition() {
            Ok(frame) => {
                self.transition(AcquisitionState::Done);
                Ok(frame)
            }
            Err(err) => {
                self.transition(AcquisitionState::Failed(err.kind()));
                Err(err)
            }
        }
    }

    fn run_acquisition(&mut self) -> Result<FullFrame, Error<I2C>> {
        let control = self.refresh_timing()?;
        let refresh = RefreshInfo::from_control(&control);
        let poll_policy = RetryPolicy::for_subpage(&refresh, self.config.poll_delay_us());
        // Shared by both subpages
        let mut sequencing = SequencingBudget {
            remaining: self.config.sequencing_attempts(),
            last_mismatch: None,
        };
        let mut stats = AcquisitionStats::default();
        let mut observed: ArrayVec<Subpage, 2> = ArrayVec::new();
        let mut ambient = [f32::NAN; 2];
        let mut temperatures = [[0f32; NUM_PIXELS]; 2];
        let mut converted = [false; 2];
        for subpage in [Subpage::Zero, Subpage::One] {
            self.transition(AcquisitionState::Awaiting(subpage));
            let outcome = self.capture_in_sequence(
                subpage,
                &poll_policy,
                control,
                &mut sequencing,
                &mut stats,
            )?;
            observed
                .try_push(outcome.subpage)
                .map_err(|_| LibraryError::Other("More than two subpages captured for a frame"))?;
            self.transition(AcquisitionState::Captured(subpage));
            let index = usize::from(subpage);
            ambient[index] = self
                .calibration
                .ambient_temperature(&self.raw[index], &self.parameters);
            trace!("T_a estimate for {:?}: {}", subpage, ambient[index]);
            // Subpages are converted as soon as there's a usable ambient temperature
            if let Some(ambient_temperature) = resolve_ambient(&ambient[..=index]) {
                self.convert(subpage, ambient_temperature, &mut temperatures[index]);
                converted[index] = true;
            }
        }
        if observed[..] != [Subpage::Zero, Subpage::One] {
            return Err(LibraryError::Other("Both subpages must be captured exactly once").into());
        }
        let ambient_temperature = resolve_ambient(&ambient).ok_or(Error::Calibration(
            LibraryError::InvalidData("Neither subpage produced a finite ambient temperature"),
        ))?;
        for (subpage, destination) in [Subpage::Zero, Subpage::One]
            .iter()
            .zip(temperatures.iter_mut())
            .filter(|(subpage, _)| !converted[usize::from(**subpage)])
        {
            self.convert(*subpage, ambient_temperature, destination);
        }
        self.transition(AcquisitionState::Merging);
        let mut pixels = [0f32; NUM_PIXELS];
        merge_frame(&temperatures[0], &temperatures[1], &mut pixels);
        self.ambient_temperature = Some(ambient_temperature);
        Ok(FullFrame {
            pixels,
            ambient_temperature,
            stats,
        })
    }

    /// Capture `expected`, waiting again if the camera reports the other subpage.
    ///
    /// Every capture attempt, successful or not, is taken out of the frame's `sequencing` budget.
    fn capture_in_sequence(
        &mut self,
        expected: Subpage,
        poll_policy: &RetryPolicy,
        control: ControlRegister,
        sequencing: &mut SequencingBudget,
        stats: &mut AcquisitionStats,
    ) -> Result<CaptureOutcome, Error<I2C>> {
        if sequencing.remaining == 0 {
            return Err(sequencing.exhausted(expected));
        }
        let policy = RetryPolicy::new(sequencing.remaining, self.config.sequencing_delay_us());
        let Self {
            bus,
            delay,
            capture,
            raw,
            last_subpage,
            ..
        } = self;
        let raw = &mut raw[usize::from(expected)];
        let outcome = policy.poll(delay, |_, delay| {
            sequencing.remaining -= 1;
            match capture.capture(bus, delay, poll_policy, expected, *last_subpage, control, raw) {
                Ok(outcome) => {
                    *last_subpage = Some(outcome.subpage);
                    Ok(Some(outcome))
                }
                Err(Error::Sequencing {
                    observed,
                    duplicate,
                    ..
                }) => {
                    sequencing.last_mismatch = Some((observed, duplicate));
                    if sequencing.remaining > 0 {
                        stats.sequencing_retries += 1;
                        debug!(
                            "Expected {:?}, got {:?} (duplicate: {}), waiting again",
                            expected, observed, duplicate
                        );
                    }
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        })?;
        match outcome {
            PollOutcome::Ready { value, .. } => {
                stats.status_polls += value.polls;
                if value.overrun {
                    stats.overruns += 1;
                }
                Ok(value)
            }
            PollOutcome::Exhausted { attempts, .. } => {
                debug!("Gave up on {:?} after {} attempts", expected, attempts);
                Err(sequencing.exhausted(expected))
            }
        }
    }

    fn convert(
        &self,
        subpage: Subpage,
        ambient_temperature: f32,
        destination: &mut [f32; NUM_PIXELS],
    ) {
        self.conversion.to_temperatures(
            &self.raw[usize::from(subpage)],
            &self.parameters,
            self.emissivity,
            ambient_temperature,
            destination,
        );
    }

    /// Read back the refresh configuration, and check it against the requested frame rate.
    fn refresh_timing(&mut self) -> Result<ControlRegister, Error<I2C>> {
        let control = self.bus.control()?;
        let refresh = RefreshInfo::from_control(&control);
        if let Some(requested) = self.config.frame_rate() {
            if requested != refresh.frame_rate() {
                return Err(Error::RefreshRateMismatch {
                    requested,
                    configured: refresh.frame_rate(),
                });
            }
        }
        if control.access_pattern() != AccessPattern::Chess {
            warn!("Camera is not using the chess pattern, merged frames will be wrong");
        }
        debug!(
            "Refreshing at {}Hz, {}s per subpage",
            refresh.full_frame_hz(),
            refresh.subpage_period_s()
        );
        self.refresh = Some(refresh);
        Ok(control)
    }

    /// Change the camera's frame rate, and request it for all future acquisitions.
    pub fn set_frame_rate(&mut self, frame_rate: FrameRate) -> Result<(), Error<I2C>> {
        self.bus.set_frame_rate(frame_rate)?;
        self.config = self.config.with_frame_rate(frame_rate);
        self.refresh_timing().map(|_| ())
    }

    fn transition(&mut self, next: AcquisitionState) {
        trace!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// The state the last acquisition ended in (or is in).
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// The emissivity currently used for conversions.
    pub fn effective_emissivity(&self) -> f32 {
        self.emissivity
    }

    /// Use a different emissivity for future conversions.
    pub fn override_emissivity(&mut self, emissivity: f32) -> Result<(), LibraryError> {
        validate_emissivity(emissivity)?;
        self.emissivity = emissivity;
        Ok(())
    }

    /// Go back to the emissivity from the configuration.
    pub fn use_default_emissivity(&mut self) {
        self.emissivity = self.config.emissivity();
    }

    /// The ambient temperature of the last successfully acquired frame.
    pub fn ambient_temperature(&self) -> Option<f32> {
        self.ambient_temperature
    }

    /// The last subpage this session read out and used.
    pub fn last_subpage(&self) -> Option<Subpage> {
        self.last_subpage
    }

    /// The refresh configuration read back most recently.
    pub fn refresh_info(&self) -> Option<RefreshInfo> {
        self.refresh
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn parameters(&self) -> &Clb::Parameters {
        &self.parameters
    }

    pub fn height(&self) -> usize {
        HEIGHT
    }

    pub fn width(&self) -> usize {
        WIDTH
    }

    /// End the session, giving back the delay and the conversion.
    ///
    /// The bus is no longer borrowed once this returns.
    pub fn release(self) -> (D, Conv) {
        (self.delay, self.conversion)
    }
}

#[cfg(test)]
mod test {
    use float_cmp::assert_approx_eq;
    use mlx90640_acquire_test_data::{I2cOperation, MockDelay, MockSensorBus, ScriptedSubpage};

    use super::*;
    use crate::test::{FixedAmbient, ScaleParameters, ScaledConversion, DIVISOR};

    const ADDRESS: u8 = 0x33;

    type TestSession<'a> =
        AcquisitionSession<'a, MockSensorBus, MockDelay, FixedAmbient, &'a ScaledConversion>;

    fn mock_camera() -> MockSensorBus {
        let camera = MockSensorBus::new(ADDRESS);
        camera.fill_eeprom(DIVISOR);
        camera
    }

    fn session<'a>(
        bus: &'a mut MockSensorBus,
        delay: &MockDelay,
        ambient: (f32, f32),
        conversion: &'a ScaledConversion,
        config: AcquisitionConfig,
    ) -> TestSession<'a> {
        AcquisitionSession::new(
            bus,
            ADDRESS,
            delay.clone(),
            FixedAmbient::new(ambient.0, ambient.1),
            conversion,
            config,
        )
        .unwrap()
    }

    fn assert_checkerboard(frame: &FullFrame, even: f32, odd: f32) {
        for row in 0..HEIGHT {
            for column in 0..WIDTH {
                let expected = if (row + column) % 2 == 0 { even } else { odd };
                let actual = frame.pixel(row, column).unwrap();
                assert!(!actual.is_nan(), "NaN at ({}, {})", row, column);
                assert_approx_eq!(f32, actual, expected);
            }
        }
    }

    #[test]
    fn end_to_end() {
        let mut camera = mock_camera();
        camera.extend_script([ScriptedSubpage::ready(0, 1000), ScriptedSubpage::ready(1, 2000)]);
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let mut session = session(
            &mut camera,
            &delay,
            (25.0, 27.0),
            &conversion,
            AcquisitionConfig::default(),
        );
        assert_eq!(session.parameters(), &ScaleParameters { divisor: 100.0 });
        let frame = session.acquire_frame().unwrap();
        assert_checkerboard(&frame, 10.0, 20.0);
        assert_approx_eq!(f32, frame.ambient_temperature(), 26.0);
        assert_eq!(
            frame.stats(),
            &AcquisitionStats {
                sequencing_retries: 0,
                overruns: 0,
                status_polls: 2,
            }
        );
        assert_eq!(session.state(), AcquisitionState::Done);
        assert_eq!(session.last_subpage(), Some(Subpage::One));
        assert_eq!(session.ambient_temperature(), Some(26.0));
        let calls = conversion.calls();
        assert_eq!(calls.len(), 2);
        // Subpage 0 only has its own estimate to go on, subpage 1 gets the average.
        assert_eq!(calls[0].subpage, Some(Subpage::Zero));
        assert_approx_eq!(f32, calls[0].ambient_temperature, 25.0);
        assert_eq!(calls[1].subpage, Some(Subpage::One));
        assert_approx_eq!(f32, calls[1].ambient_temperature, 26.0);
        assert_approx_eq!(f32, calls[1].emissivity, 0.95);
        // Nothing had to wait
        assert_eq!(delay.total_us(), 0);
    }

    #[test]
    fn duplicate_subpage_retried_once() {
        let mut camera = mock_camera();
        camera.extend_script([
            ScriptedSubpage::ready(0, 1000),
            ScriptedSubpage::ready(0, 1500),
            ScriptedSubpage::ready(1, 2000),
        ]);
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let mut session = session(
            &mut camera,
            &delay,
            (25.0, 25.0),
            &conversion,
            AcquisitionConfig::default(),
        );
        let frame = session.acquire_frame().unwrap();
        assert_eq!(frame.stats().sequencing_retries, 1);
        // The second copy of subpage 0 never makes it into the frame
        assert_checkerboard(&frame, 10.0, 20.0);
        let calls = conversion.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].subpage, Some(Subpage::Zero));
        assert_eq!(calls[1].subpage, Some(Subpage::One));
        assert_eq!(
            delay.total_us(),
            u64::from(AcquisitionConfig::DEFAULT_SEQUENCING_DELAY_US)
        );
    }

    #[test]
    fn starting_on_subpage_one() {
        let mut camera = mock_camera();
        camera.extend_script([
            ScriptedSubpage::ready(1, 500),
            ScriptedSubpage::ready(0, 1000),
            ScriptedSubpage::ready(1, 2000),
        ]);
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let mut session = session(
            &mut camera,
            &delay,
            (25.0, 25.0),
            &conversion,
            AcquisitionConfig::default(),
        );
        let frame = session.acquire_frame().unwrap();
        assert_eq!(frame.stats().sequencing_retries, 1);
        assert_checkerboard(&frame, 10.0, 20.0);
    }

    #[test]
    fn sequencing_budget_exhausted() {
        let mut camera = mock_camera();
        camera.push_subpage(ScriptedSubpage::ready(1, 0));
        camera.set_repeat_script(true);
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let config = AcquisitionConfig::default().with_sequencing_attempts(3);
        let mut session = session(&mut camera, &delay, (25.0, 25.0), &conversion, config);
        let result = session.acquire_frame();
        // Nothing has been consumed yet, so subpage 1 isn't a duplicate
        assert!(matches!(
            result,
            Err(Error::Sequencing {
                expected: Subpage::Zero,
                observed: Subpage::One,
                duplicate: false
            })
        ));
        assert_eq!(
            session.state(),
            AcquisitionState::Failed(ErrorKind::Sequencing)
        );
        // Rejected subpages are acknowledged, but never recorded as consumed
        assert_eq!(session.last_subpage(), None);
        // Two sleeps between three attempts
        assert_eq!(
            delay.total_us(),
            2 * u64::from(AcquisitionConfig::DEFAULT_SEQUENCING_DELAY_US)
        );
        assert!(conversion.calls().is_empty());
    }

    #[test]
    fn sequencing_budget_shared_by_subpages() {
        let script = [
            ScriptedSubpage::ready(1, 500),
            ScriptedSubpage::ready(0, 1000),
            ScriptedSubpage::ready(0, 1500),
            ScriptedSubpage::ready(1, 2000),
        ];
        // Four captures are needed, three are allowed
        let mut camera = mock_camera();
        camera.extend_script(script);
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let config = AcquisitionConfig::default().with_sequencing_attempts(3);
        let mut short = session(&mut camera, &delay, (25.0, 25.0), &conversion, config);
        let result = short.acquire_frame();
        assert!(matches!(
            result,
            Err(Error::Sequencing {
                expected: Subpage::One,
                observed: Subpage::Zero,
                duplicate: true
            })
        ));
        assert_eq!(short.last_subpage(), Some(Subpage::Zero));
        assert_eq!(conversion.calls().len(), 1);

        // With one more attempt the same sequence makes a frame
        let mut camera = mock_camera();
        camera.extend_script(script);
        let conversion = ScaledConversion::default();
        let config = AcquisitionConfig::default().with_sequencing_attempts(4);
        let mut enough = session(&mut camera, &delay, (25.0, 25.0), &conversion, config);
        let frame = enough.acquire_frame().unwrap();
        assert_eq!(frame.stats().sequencing_retries, 2);
        assert_checkerboard(&frame, 10.0, 20.0);
    }

    #[test]
    fn stale_subpage_is_duplicate() {
        let mut camera = mock_camera();
        let observer = camera.clone();
        camera.extend_script([ScriptedSubpage::ready(0, 1000), ScriptedSubpage::ready(1, 2000)]);
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let config = AcquisitionConfig::default().with_sequencing_attempts(3);
        let mut session = session(&mut camera, &delay, (25.0, 25.0), &conversion, config);
        session.acquire_frame().unwrap();
        assert_eq!(session.last_subpage(), Some(Subpage::One));
        // The camera keeps handing out subpage 1
        observer.push_subpage(ScriptedSubpage::ready(1, 2000));
        observer.set_repeat_script(true);
        let result = session.acquire_frame();
        assert!(matches!(
            result,
            Err(Error::Sequencing {
                expected: Subpage::Zero,
                observed: Subpage::One,
                duplicate: true
            })
        ));
        assert_eq!(session.last_subpage(), Some(Subpage::One));
    }

    #[test]
    fn no_finite_ambient_temperature() {
        let mut camera = mock_camera();
        camera.extend_script([ScriptedSubpage::ready(0, 1000), ScriptedSubpage::ready(1, 2000)]);
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let mut session = session(
            &mut camera,
            &delay,
            (f32::NAN, f32::INFINITY),
            &conversion,
            AcquisitionConfig::default(),
        );
        let result = session.acquire_frame();
        assert!(matches!(result, Err(Error::Calibration(_))));
        assert_eq!(
            session.state(),
            AcquisitionState::Failed(ErrorKind::Calibration)
        );
        assert_eq!(session.ambient_temperature(), None);
        assert!(conversion.calls().is_empty());
    }

    #[test]
    fn one_finite_ambient_temperature() {
        let mut camera = mock_camera();
        camera.extend_script([ScriptedSubpage::ready(0, 1000), ScriptedSubpage::ready(1, 2000)]);
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let mut session = session(
            &mut camera,
            &delay,
            (f32::NAN, 30.0),
            &conversion,
            AcquisitionConfig::default(),
        );
        let frame = session.acquire_frame().unwrap();
        assert_approx_eq!(f32, frame.ambient_temperature(), 30.0);
        assert_checkerboard(&frame, 10.0, 20.0);
        let calls = conversion.calls();
        // Subpage 0 had to wait for subpage 1's ambient temperature
        assert_eq!(calls[0].subpage, Some(Subpage::One));
        assert_eq!(calls[1].subpage, Some(Subpage::Zero));
        assert!(calls
            .iter()
            .all(|call| call.ambient_temperature == 30.0));
    }

    #[test]
    fn timeout_within_budget() {
        let mut camera = mock_camera();
        let observer = camera.clone();
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let mut session = session(
            &mut camera,
            &delay,
            (25.0, 25.0),
            &conversion,
            AcquisitionConfig::default(),
        );
        let result = session.acquire_frame();
        // 2Hz by default, so one poll and then 63 more 5ms apart
        assert!(matches!(
            result,
            Err(Error::Timeout {
                attempts: 64,
                waited_us: 315_000
            })
        ));
        assert_eq!(session.state(), AcquisitionState::Failed(ErrorKind::Timeout));
        assert_eq!(delay.total_us(), 315_000);
        // Longer than a 2Hz subpage, with margin
        assert!(delay.total_us() >= 312_500);
        assert_eq!(observer.status_reads(), 64);
    }

    #[test]
    fn reserved_subpage_is_protocol_error() {
        let mut camera = mock_camera();
        camera.push_subpage(ScriptedSubpage::raw_status(0x000A, 0));
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let mut session = session(
            &mut camera,
            &delay,
            (25.0, 25.0),
            &conversion,
            AcquisitionConfig::default(),
        );
        let result = session.acquire_frame();
        assert!(matches!(result, Err(Error::Protocol { status: 0x000A })));
        assert_eq!(
            session.state(),
            AcquisitionState::Failed(ErrorKind::Protocol)
        );
    }

    #[test]
    fn bus_error_discards_frame() {
        let mut camera = mock_camera();
        let observer = camera.clone();
        camera.extend_script([ScriptedSubpage::ready(0, 1000), ScriptedSubpage::ready(1, 2000)]);
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let mut session = session(
            &mut camera,
            &delay,
            (25.0, 25.0),
            &conversion,
            AcquisitionConfig::default(),
        );
        observer.fail_reads_from(Some(0x0400));
        let result = session.acquire_frame();
        assert!(matches!(result, Err(Error::I2cWriteReadError(_))));
        assert_eq!(session.state(), AcquisitionState::Failed(ErrorKind::Bus));
        assert!(conversion.calls().is_empty());
        // The session itself is still usable once the bus recovers
        observer.fail_reads_from(None);
        let frame = session.acquire_frame().unwrap();
        assert_checkerboard(&frame, 10.0, 20.0);
    }

    #[test]
    fn overrun_counted() {
        let mut camera = mock_camera();
        camera.extend_script([
            ScriptedSubpage::ready(0, 1000).with_overrun(),
            ScriptedSubpage::ready(1, 2000),
        ]);
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let mut session = session(
            &mut camera,
            &delay,
            (25.0, 25.0),
            &conversion,
            AcquisitionConfig::default(),
        );
        let frame = session.acquire_frame().unwrap();
        assert_eq!(frame.stats().overruns, 1);
    }

    #[test]
    fn requested_frame_rate() {
        let mut camera = mock_camera();
        let observer = camera.clone();
        camera.extend_script([ScriptedSubpage::ready(0, 1000), ScriptedSubpage::ready(1, 2000)]);
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let config = AcquisitionConfig::default().with_frame_rate(FrameRate::Eight);
        let mut session = session(&mut camera, &delay, (25.0, 25.0), &conversion, config);
        assert_eq!(observer.control_register() & 0x0380, 4 << 7);
        let refresh = session.refresh_info().unwrap();
        assert_eq!(refresh.frame_rate(), FrameRate::Eight);
        // Something else puts the camera back to 2Hz
        observer.set_control_register(0x1901);
        let result = session.acquire_frame();
        assert!(matches!(
            result,
            Err(Error::RefreshRateMismatch {
                requested: FrameRate::Eight,
                configured: FrameRate::Two
            })
        ));
        assert_eq!(
            session.state(),
            AcquisitionState::Failed(ErrorKind::RefreshRate)
        );
        session.set_frame_rate(FrameRate::Four).unwrap();
        assert!(session.acquire_frame().is_ok());
    }

    #[test]
    fn emissivity_override() {
        let mut camera = mock_camera();
        camera.extend_script([ScriptedSubpage::ready(0, 1000), ScriptedSubpage::ready(1, 2000)]);
        camera.set_repeat_script(true);
        let delay = MockDelay::new();
        let conversion = ScaledConversion::default();
        let mut session = session(
            &mut camera,
            &delay,
            (25.0, 25.0),
            &conversion,
            AcquisitionConfig::default(),
        );
        assert!(session.override_emissivity(0.0).is_err());
        assert!(session.override_emissivity(1.5).is_err());
        session.override_emissivity(0.5).unwrap();
        assert_eq!(session.effective_emissivity(), 0.5);
        session.acquire_frame().unwrap();
        session.use_default_emissivity();
        session.acquire_frame().unwrap();
        let emissivities: ArrayVec<f32, 16> =
            conversion.calls().iter().map(|call| call.emissivity).collect();
        assert_eq!(&emissivities[..], &[0.5, 0.5, 0.95, 0.95]);
    }

    #[test]
    fn with_parameters_skips_eeprom() {
        // The EEPROM is left empty, so extracting parameters would fail.
        let mut camera = MockSensorBus::new(ADDRESS);
        let observer = camera.clone();
        let extracted = AcquisitionSession::new(
            &mut camera,
            ADDRESS,
            MockDelay::new(),
            FixedAmbient::new(25.0, 25.0),
            ScaledConversion::default(),
            AcquisitionConfig::default(),
        )
        .map(|_| ());
        assert!(matches!(extracted, Err(Error::Calibration(_))));
        observer.clear_recent_operations();
        let session = AcquisitionSession::with_parameters(
            &mut camera,
            ADDRESS,
            MockDelay::new(),
            FixedAmbient::new(25.0, 25.0),
            ScaleParameters { divisor: 100.0 },
            ScaledConversion::default(),
            AcquisitionConfig::default(),
        )
        .unwrap();
        assert_eq!(session.width(), 32);
        assert_eq!(session.height(), 24);
        assert_eq!(session.state(), AcquisitionState::Idle);
        let (_delay, _conversion) = session.release();
        // Only the control register was read
        assert_eq!(
            &observer.recent_operations().iter().copied().collect::<ArrayVec<_, 4>>()[..],
            &[I2cOperation::Read {
                address: 0x800D,
                length: 1
            }]
        );
    }

    #[test]
    fn invalid_config_rejected() {
        let mut camera = mock_camera();
        let result = AcquisitionSession::new(
            &mut camera,
            ADDRESS,
            MockDelay::new(),
            FixedAmbient::new(25.0, 25.0),
            ScaledConversion::default(),
            AcquisitionConfig::default().with_poll_delay_us(0),
        );
        assert!(matches!(result, Err(Error::LibraryError(_))));
    }

    #[test]
    fn resolve_ambient_estimates() {
        assert_eq!(resolve_ambient(&[20.0, 30.0]), Some(25.0));
        assert_eq!(resolve_ambient(&[f32::NAN, 30.0]), Some(30.0));
        assert_eq!(resolve_ambient(&[20.0, f32::NEG_INFINITY]), Some(20.0));
        assert_eq!(resolve_ambient(&[f32::NAN, f32::NAN]), None);
        assert_eq!(resolve_ambient(&[]), None);
    }

    #[test]
    fn frame_pixel_bounds() {
        let frame = FullFrame {
            pixels: [1.0; NUM_PIXELS],
            ambient_temperature: 20.0,
            stats: AcquisitionStats::default(),
        };
        assert_eq!(frame.pixel(23, 31), Some(1.0));
        assert_eq!(frame.pixel(24, 0), None);
        assert_eq!(frame.pixel(0, 32), None);
    }

    #[test]
    fn frame_summary() {
        let mut pixels = [20.0; NUM_PIXELS];
        pixels[0] = -4.0;
        pixels[NUM_PIXELS - 1] = 44.0;
        let frame = FullFrame {
            pixels,
            ambient_temperature: 20.0,
            stats: AcquisitionStats::default(),
        };
        let summary = frame.summary();
        assert_approx_eq!(f32, summary.min, -4.0);
        assert_approx_eq!(f32, summary.max, 44.0);
        assert_approx_eq!(f32, summary.mean, 20.0, epsilon = 0.0001);
    }
}
