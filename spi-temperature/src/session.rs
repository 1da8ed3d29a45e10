//! Sensor sessions.
//!
//! A session drives one configured chip. Construction sends the bus and
//! chip setup commands, [`SensorSession::setup_minmax`] fixes the accepted
//! raw range, and [`SensorSession::build_config`] starts periodic polling.
//! From then on every `thermocouple_result` from the MCU is decoded and
//! handed to the registered callback.
//!
//! ```text
//! Unconfigured -> BusConfigured -> ChipConfigured -> Polling
//! ```
//!
//! States only move forward. A fault on one sample is reported and the
//! session keeps polling; the next sample is processed normally.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bounds::{AdcBounds, compute_bounds};
use crate::chip::{Chip, RawSample};
use crate::command::Command;
use crate::config::SpiBusConfig;
use crate::error::{ConfigError, ConfigResult, SensorFault, SessionError};
use crate::mcu::{ClockSync, Mcu, Oid, THERMOCOUPLE_RESULT, ThermocoupleResult};
use crate::tracing::prelude::*;

/// Interval between samples requested from the MCU, in seconds.
pub const REPORT_TIME: f64 = 0.300;

/// Buffered `thermocouple_result` messages per session.
const MESSAGE_QUEUE: usize = 16;

/// Where a session is in its setup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Unconfigured,
    BusConfigured,
    ChipConfigured,
    Polling,
}

/// A decoded sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Host print time at which the sample was taken
    pub time: f64,
    /// Degrees Celsius
    pub temperature: f64,
}

/// A fault raised while processing one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleFault {
    pub oid: Oid,
    /// Host print time at which the sample was taken
    pub time: f64,
    pub fault: SensorFault,
}

/// Receives `(print_time, temperature)` for every good sample.
pub type TemperatureCallback = Box<dyn FnMut(f64, f64) + Send>;

pub struct SensorSession {
    chip: Chip,
    oid: Oid,
    spi_oid: Oid,
    state: SessionState,
    bounds: Option<AdcBounds>,
    /// Report interval in MCU clock ticks, set when polling starts
    report_clock: u64,
    callback: Option<TemperatureCallback>,
    messages: Option<mpsc::Receiver<ThermocoupleResult>>,
}

impl SensorSession {
    /// Configure the SPI bus and the chip, and subscribe to results.
    ///
    /// The session is left in [`SessionState::ChipConfigured`].
    pub fn new(spi: &SpiBusConfig, chip: Chip, mcu: &mut dyn Mcu) -> Self {
        let mut session = Self {
            chip,
            oid: 0,
            spi_oid: 0,
            state: SessionState::Unconfigured,
            bounds: None,
            report_clock: 0,
            callback: None,
            messages: None,
        };
        session.configure_bus(spi, mcu);
        session.configure_chip(mcu);
        session
    }

    fn configure_bus(&mut self, spi: &SpiBusConfig, mcu: &mut dyn Mcu) {
        self.spi_oid = mcu.create_oid();
        send(
            mcu,
            Command::ConfigSpi {
                oid: self.spi_oid,
                bus: spi.bus,
                pin: spi.pin.clone(),
                mode: spi.mode,
                rate: spi.rate,
            },
            false,
        );
        self.state = SessionState::BusConfigured;
    }

    fn configure_chip(&mut self, mcu: &mut dyn Mcu) {
        send(
            mcu,
            Command::SpiSend {
                oid: self.spi_oid,
                data: self.chip.init_bytes(),
            },
            true,
        );

        self.oid = mcu.create_oid();
        send(
            mcu,
            Command::ConfigThermocouple {
                oid: self.oid,
                spi_oid: self.spi_oid,
                chip_type: self.chip.kind().wire_id(),
            },
            false,
        );

        let (tx, rx) = mpsc::channel(MESSAGE_QUEUE);
        mcu.register_msg(THERMOCOUPLE_RESULT, self.oid, tx);
        self.messages = Some(rx);
        self.state = SessionState::ChipConfigured;

        debug!(
            chip = %self.chip.kind(),
            oid = self.oid,
            spi_oid = self.spi_oid,
            "Sensor chip configured"
        );
    }

    pub fn chip(&self) -> &Chip {
        &self.chip
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn bounds(&self) -> Option<AdcBounds> {
        self.bounds
    }

    /// Set the temperature range the MCU accepts without shutting down.
    pub fn setup_minmax(&mut self, min_temp: f64, max_temp: f64) -> ConfigResult<()> {
        if self.state == SessionState::Polling {
            return Err(ConfigError::WrongState {
                expected: SessionState::ChipConfigured,
                actual: self.state,
            });
        }
        let bounds = compute_bounds(&self.chip, min_temp, max_temp)?;
        debug!(
            min_temp,
            max_temp,
            min_raw = bounds.min,
            max_raw = bounds.max,
            "ADC range configured"
        );
        self.bounds = Some(bounds);
        Ok(())
    }

    pub fn setup_callback(&mut self, callback: TemperatureCallback) {
        self.callback = Some(callback);
    }

    pub fn get_report_time_delta(&self) -> f64 {
        REPORT_TIME
    }

    /// Start periodic sampling.
    ///
    /// Called when the MCU's configuration is finalized; the range must
    /// already be set.
    pub fn build_config(&mut self, mcu: &mut dyn Mcu) -> ConfigResult<()> {
        if self.state != SessionState::ChipConfigured {
            return Err(ConfigError::WrongState {
                expected: SessionState::ChipConfigured,
                actual: self.state,
            });
        }
        let bounds = self.bounds.ok_or(ConfigError::BoundsNotSet)?;

        let clock = mcu.get_query_slot(self.oid);
        self.report_clock = mcu.seconds_to_clock(REPORT_TIME);
        send(
            mcu,
            Command::QueryThermocouple {
                oid: self.oid,
                clock,
                rest_ticks: self.report_clock,
                min_value: bounds.min,
                max_value: bounds.max,
            },
            false,
        );
        self.state = SessionState::Polling;

        info!(
            chip = %self.chip.kind(),
            oid = self.oid,
            "Polling sensor every {}s",
            REPORT_TIME
        );
        Ok(())
    }

    /// Decode one result and pass the reading to the callback.
    ///
    /// On a fault the callback is not invoked and the fault is returned.
    pub fn handle_result(
        &mut self,
        msg: &ThermocoupleResult,
        clock: &dyn ClockSync,
    ) -> Result<Reading, SampleFault> {
        let next_clock = clock.clock32_to_clock64(msg.next_clock);
        let read_clock = next_clock.saturating_sub(self.report_clock);
        let time = clock.clock_to_print_time(read_clock);

        trace!(
            oid = self.oid,
            value = format!("{:#010x}", msg.value),
            fault = format!("{:#04x}", msg.fault),
            "Raw sample"
        );

        let temperature = self
            .chip
            .decode(RawSample::new(msg.value, msg.fault))
            .map_err(|fault| SampleFault {
                oid: self.oid,
                time,
                fault,
            })?;

        if let Some(callback) = self.callback.as_mut() {
            callback(time, temperature);
        }
        Ok(Reading { time, temperature })
    }

    /// Process results until shutdown or until the MCU side goes away.
    ///
    /// Faults are logged and forwarded to `faults` without waiting; when
    /// the supervisor is behind, the fault is only logged. Polling
    /// continues either way.
    pub async fn run<C: ClockSync>(
        mut self,
        clock: C,
        faults: mpsc::Sender<SampleFault>,
        shutdown: CancellationToken,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Polling {
            return Err(SessionError::NotPolling(self.state));
        }
        let mut messages = self.messages.take().ok_or(SessionError::ChannelTaken)?;

        loop {
            tokio::select! {
                msg = messages.recv() => {
                    let Some(msg) = msg else {
                        debug!(oid = self.oid, "Result channel closed");
                        break;
                    };
                    let outcome = self.handle_result(&msg, &clock);
                    if let Err(fault) = outcome {
                        warn!(oid = fault.oid, time = fault.time, "{}", fault.fault);
                        match faults.try_send(fault) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(fault)) => {
                                error!(
                                    oid = fault.oid,
                                    "Fault queue full, not forwarded: {}",
                                    fault.fault
                                );
                            }
                            Err(mpsc::error::TrySendError::Closed(fault)) => {
                                error!(oid = fault.oid, "Fault receiver dropped: {}", fault.fault);
                            }
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    debug!(oid = self.oid, "Sensor session shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

fn send(mcu: &mut dyn Mcu, cmd: Command, is_init: bool) {
    let text = cmd.to_string();
    debug!(cmd = %text, is_init, "Config command");
    mcu.add_config_cmd(text, is_init);
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::chip::{MainsFilter, max31855, max31856, max31865};
    use crate::mcu::RecordingMcu;

    const FREQ: f64 = 16_000_000.0;

    fn spi() -> SpiBusConfig {
        SpiBusConfig {
            bus: 0,
            pin: "PA4".into(),
            mode: 1,
            rate: 4_000_000,
        }
    }

    fn polling_session(chip: Chip, mcu: &mut RecordingMcu) -> SensorSession {
        let mut session = SensorSession::new(&spi(), chip, mcu);
        session.setup_minmax(0.0, 300.0).unwrap();
        session.build_config(mcu).unwrap();
        session
    }

    fn result(oid: Oid, next_clock: u32, value: u32, fault: u8) -> ThermocoupleResult {
        ThermocoupleResult {
            oid,
            next_clock,
            value,
            fault,
        }
    }

    #[test]
    fn setup_sends_commands_in_order() {
        let mut mcu = RecordingMcu::new(FREQ);
        mcu.set_query_base(1_000_000);
        let chip = Chip::Max31856(max31856::Config {
            filter: MainsFilter::Hz50,
            ..Default::default()
        });

        let mut session = SensorSession::new(&spi(), chip, &mut mcu);
        assert_eq!(session.state(), SessionState::ChipConfigured);
        session.setup_minmax(0.0, 100.0).unwrap();
        session.build_config(&mut mcu).unwrap();
        assert_eq!(session.state(), SessionState::Polling);

        assert_eq!(
            mcu.command_texts(),
            vec![
                "config_spi oid=0 bus=0 pin=PA4 mode=1 rate=4000000 shutdown_msg=",
                "config_thermocouple oid=1 spi_oid=0 chip_type=2",
                "query_thermocouple oid=1 clock=1160000 rest_ticks=4800000 \
                 min_value=0 max_value=409600",
                "spi_send oid=0 data=808181038203",
            ]
        );
        assert!(mcu.commands()[1].is_init);
    }

    #[test]
    fn spi_device_exists_before_init_write() {
        let mut mcu = RecordingMcu::new(FREQ);
        let _session = SensorSession::new(&spi(), Chip::Max31855, &mut mcu);

        let texts = mcu.command_texts();
        assert!(texts[0].starts_with("config_spi oid=0 "), "{:?}", texts);
        let config = texts.iter().position(|t| t.starts_with("config_spi oid=0 "));
        let init = texts.iter().position(|t| t.starts_with("spi_send oid=0 "));
        assert!(config < init, "{:?}", texts);
    }

    #[test]
    fn range_below_zero_sent_as_signed_limits() {
        let mut mcu = RecordingMcu::new(FREQ);
        let mut session = SensorSession::new(&spi(), Chip::Max31855, &mut mcu);
        session.setup_minmax(-50.0, 250.0).unwrap();
        session.build_config(&mut mcu).unwrap();

        let query = mcu.command_texts()[2];
        assert!(
            query.ends_with("min_value=-52428800 max_value=262144000"),
            "{}",
            query
        );
    }

    #[test]
    fn chip_type_independent_of_creation_order() {
        let mut mcu = RecordingMcu::new(FREQ);
        let rtd = SensorSession::new(
            &spi(),
            Chip::Max31865(max31865::Config::default()),
            &mut mcu,
        );
        let tc = SensorSession::new(&spi(), Chip::Max6675, &mut mcu);

        let texts = mcu.command_texts();
        assert!(texts.contains(&"config_thermocouple oid=1 spi_oid=0 chip_type=4"));
        assert!(texts.contains(&"config_thermocouple oid=3 spi_oid=2 chip_type=8"));
        assert_eq!(rtd.oid(), 1);
        assert_eq!(tc.oid(), 3);
    }

    #[test]
    fn build_config_requires_bounds() {
        let mut mcu = RecordingMcu::new(FREQ);
        let mut session = SensorSession::new(&spi(), Chip::Max31855, &mut mcu);
        assert_eq!(session.build_config(&mut mcu), Err(ConfigError::BoundsNotSet));
        assert_eq!(session.state(), SessionState::ChipConfigured);
    }

    #[test]
    fn report_interval_matches_query_rest_ticks() {
        let mut mcu = RecordingMcu::new(FREQ);
        let session = polling_session(Chip::Max6675, &mut mcu);
        assert_eq!(session.get_report_time_delta(), 0.3);
        let query = mcu.command_texts()[2].to_string();
        assert!(query.contains("rest_ticks=4800000"), "{}", query);
    }

    #[test]
    fn no_transition_back_from_polling() {
        let mut mcu = RecordingMcu::new(FREQ);
        let mut session = polling_session(Chip::Max31855, &mut mcu);
        assert!(session.build_config(&mut mcu).is_err());
        assert!(session.setup_minmax(0.0, 10.0).is_err());
        assert_eq!(session.state(), SessionState::Polling);
    }

    #[test]
    fn reading_time_is_one_interval_before_next_clock() {
        let mut mcu = RecordingMcu::new(FREQ);
        let mut session = polling_session(Chip::Max31855, &mut mcu);

        // next_clock at 1.3s, so the sample was taken at 1.0s
        let msg = result(session.oid(), 20_800_000, 100 << 18, 0);
        let reading = session.handle_result(&msg, &mcu).unwrap();
        assert_eq!(
            reading,
            Reading {
                time: 1.0,
                temperature: 25.0
            }
        );
    }

    #[test]
    fn callback_receives_readings_but_not_faults() {
        let mut mcu = RecordingMcu::new(FREQ);
        let mut session = polling_session(Chip::Max31855, &mut mcu);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.setup_callback(Box::new(move |time, temp| {
            sink.lock().unwrap().push((time, temp));
        }));

        let oid = session.oid();
        let err = session
            .handle_result(&result(oid, 4_800_000, 0x1, 0), &mcu)
            .unwrap_err();
        assert_eq!(err.fault, SensorFault::Max31855(max31855::Fault::OpenCircuit));
        assert_eq!(err.oid, oid);

        // A fault does not stop later samples
        session
            .handle_result(&result(oid, 9_600_000, 8 << 18, 0), &mcu)
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(0.3, 2.0)]);
    }

    #[tokio::test]
    async fn run_forwards_faults_and_keeps_polling() {
        let mut mcu = RecordingMcu::new(FREQ);
        let mut session = polling_session(
            Chip::Max31865(max31865::Config::default()),
            &mut mcu,
        );
        let oid = session.oid();

        let (reading_tx, mut reading_rx) = mpsc::unbounded_channel();
        session.setup_callback(Box::new(move |time, temp| {
            let _ = reading_tx.send((time, temp));
        }));

        let (fault_tx, mut fault_rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let clock = RecordingMcu::new(FREQ);
        let task = tokio::spawn(session.run(clock, fault_tx, shutdown.clone()));

        let good = max31865::encode(&max31865::Config::default(), 100.0) as u32;
        assert!(mcu.deliver(THERMOCOUPLE_RESULT, result(oid, 4_800_000, 0, 0x40)).await);
        assert!(mcu.deliver(THERMOCOUPLE_RESULT, result(oid, 9_600_000, good, 0)).await);

        let fault = fault_rx.recv().await.unwrap();
        assert_eq!(fault.fault, SensorFault::Max31865(max31865::Fault::Shorted));

        let (time, temp) = reading_rx.recv().await.unwrap();
        assert_eq!(time, 0.3);
        assert!((temp - 100.0).abs() < 0.05);

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn full_fault_queue_does_not_stall_readings() {
        let mut mcu = RecordingMcu::new(FREQ);
        let mut session = polling_session(Chip::Max31855, &mut mcu);
        let oid = session.oid();

        let (reading_tx, mut reading_rx) = mpsc::unbounded_channel();
        session.setup_callback(Box::new(move |_, temp| {
            let _ = reading_tx.send(temp);
        }));

        // Room for one fault, and nobody reads it until the end
        let (fault_tx, mut fault_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let clock = RecordingMcu::new(FREQ);
        let task = tokio::spawn(session.run(clock, fault_tx, shutdown.clone()));

        for next_clock in [4_800_000, 9_600_000, 14_400_000] {
            let open = result(oid, next_clock, 0x1, 0);
            assert!(mcu.deliver(THERMOCOUPLE_RESULT, open).await);
        }
        let good = result(oid, 19_200_000, 8 << 18, 0);
        assert!(mcu.deliver(THERMOCOUPLE_RESULT, good).await);

        assert_eq!(reading_rx.recv().await, Some(2.0));

        shutdown.cancel();
        task.await.unwrap().unwrap();

        assert!(fault_rx.recv().await.is_some());
        assert!(fault_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn run_requires_polling() {
        let mut mcu = RecordingMcu::new(FREQ);
        let session = SensorSession::new(&spi(), Chip::Max6675, &mut mcu);
        let (fault_tx, _fault_rx) = mpsc::channel(1);
        let result = session
            .run(RecordingMcu::new(FREQ), fault_tx, CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(SessionError::NotPolling(SessionState::ChipConfigured))
        ));
    }
}
