//! Interface to the MCU that samples the sensors.
//!
//! The transport, clock synchronization and message decoding live outside
//! this crate. Sessions only see the [`Mcu`] trait: they queue
//! configuration commands, ask for clock conversions, and subscribe to
//! `thermocouple_result` messages through a channel.
//!
//! [`RecordingMcu`] implements the trait without any hardware. It records
//! every command and lets the caller inject responses, which is what the
//! CLI and the tests use.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::tracing::prelude::*;

/// MCU object identifier.
pub type Oid = u32;

/// Name of the periodic response message sent by the MCU.
pub const THERMOCOUPLE_RESULT: &str = "thermocouple_result";

/// One decoded `thermocouple_result` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThermocoupleResult {
    pub oid: Oid,
    /// Low 32 bits of the clock at which the next sample will be taken
    pub next_clock: u32,
    pub value: u32,
    pub fault: u8,
}

/// Clock conversions that remain valid while sampling.
pub trait ClockSync {
    /// Extend a 32-bit MCU clock to the full 64-bit clock.
    fn clock32_to_clock64(&self, clock32: u32) -> u64;

    /// Convert an MCU clock to host print time, in seconds.
    fn clock_to_print_time(&self, clock: u64) -> f64;
}

impl<T: ClockSync + ?Sized> ClockSync for &T {
    fn clock32_to_clock64(&self, clock32: u32) -> u64 {
        (**self).clock32_to_clock64(clock32)
    }

    fn clock_to_print_time(&self, clock: u64) -> f64 {
        (**self).clock_to_print_time(clock)
    }
}

/// Configuration-time MCU operations.
pub trait Mcu: ClockSync {
    fn create_oid(&mut self) -> Oid;

    /// Queue a configuration command.
    ///
    /// Commands with `is_init` set are sent once, after every other
    /// configuration command has been accepted, and are not repeated when
    /// the MCU is reconfigured.
    fn add_config_cmd(&mut self, cmd: String, is_init: bool);

    /// Route messages named `name` for `oid` into `tx`.
    fn register_msg(&mut self, name: &'static str, oid: Oid, tx: mpsc::Sender<ThermocoupleResult>);

    /// First clock at which `oid` may be queried.
    fn get_query_slot(&mut self, oid: Oid) -> u64;

    fn seconds_to_clock(&self, seconds: f64) -> u64;
}

/// A queued configuration command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCmd {
    pub text: String,
    pub is_init: bool,
}

/// In-memory [`Mcu`] that records commands instead of sending them.
pub struct RecordingMcu {
    frequency: f64,
    next_oid: Oid,
    query_base: u64,
    last_clock: u64,
    commands: Vec<ConfigCmd>,
    subscribers: HashMap<(&'static str, Oid), mpsc::Sender<ThermocoupleResult>>,
}

impl RecordingMcu {
    /// Create an MCU running at `frequency` Hz.
    pub fn new(frequency: f64) -> Self {
        Self {
            frequency,
            next_oid: 0,
            query_base: 0,
            last_clock: 0,
            commands: Vec::new(),
            subscribers: HashMap::new(),
        }
    }

    /// Clock from which query slots are handed out.
    pub fn set_query_base(&mut self, clock: u64) {
        self.query_base = clock;
    }

    /// Most recent 64-bit clock known to the host.
    pub fn set_last_clock(&mut self, clock: u64) {
        self.last_clock = clock;
    }

    pub fn commands(&self) -> &[ConfigCmd] {
        &self.commands
    }

    /// Command texts in the order the MCU would receive them: init
    /// commands last, each group in queue order.
    pub fn command_texts(&self) -> Vec<&str> {
        let config = self.commands.iter().filter(|c| !c.is_init);
        let init = self.commands.iter().filter(|c| c.is_init);
        config.chain(init).map(|c| c.text.as_str()).collect()
    }

    /// Deliver a response to whoever registered for it.
    ///
    /// Returns false when nobody is subscribed or the subscriber is gone.
    pub async fn deliver(&self, name: &'static str, msg: ThermocoupleResult) -> bool {
        match self.subscribers.get(&(name, msg.oid)) {
            Some(tx) => tx.send(msg).await.is_ok(),
            None => {
                debug!(msg_name = name, oid = msg.oid, "No subscriber for message");
                false
            }
        }
    }
}

impl ClockSync for RecordingMcu {
    fn clock32_to_clock64(&self, clock32: u32) -> u64 {
        let last = self.last_clock;
        let mut diff = (u64::from(clock32).wrapping_sub(last) & 0xffff_ffff) as i64;
        // Treat a backwards step of less than half the range as negative
        if diff & 0x8000_0000 != 0 {
            diff -= 0x1_0000_0000;
        }
        last.wrapping_add_signed(diff)
    }

    fn clock_to_print_time(&self, clock: u64) -> f64 {
        clock as f64 / self.frequency
    }
}

impl Mcu for RecordingMcu {
    fn create_oid(&mut self) -> Oid {
        let oid = self.next_oid;
        self.next_oid += 1;
        oid
    }

    fn add_config_cmd(&mut self, cmd: String, is_init: bool) {
        trace!(cmd = %cmd, is_init, "Queued config command");
        self.commands.push(ConfigCmd { text: cmd, is_init });
    }

    fn register_msg(&mut self, name: &'static str, oid: Oid, tx: mpsc::Sender<ThermocoupleResult>) {
        self.subscribers.insert((name, oid), tx);
    }

    fn get_query_slot(&mut self, oid: Oid) -> u64 {
        // Stagger queries by 10ms per object so they do not collide
        self.query_base + self.seconds_to_clock(f64::from(oid) * 0.01)
    }

    fn seconds_to_clock(&self, seconds: f64) -> u64 {
        (seconds * self.frequency) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oids_are_sequential() {
        let mut mcu = RecordingMcu::new(16_000_000.0);
        assert_eq!(mcu.create_oid(), 0);
        assert_eq!(mcu.create_oid(), 1);
        assert_eq!(mcu.create_oid(), 2);
    }

    #[test]
    fn init_commands_sent_after_config() {
        let mut mcu = RecordingMcu::new(16_000_000.0);
        mcu.add_config_cmd("a".into(), false);
        mcu.add_config_cmd("b".into(), true);
        mcu.add_config_cmd("c".into(), false);
        mcu.add_config_cmd("d".into(), true);
        assert_eq!(mcu.command_texts(), vec!["a", "c", "b", "d"]);
        assert_eq!(mcu.commands().len(), 4);
    }

    #[test]
    fn clock32_extension() {
        let mut mcu = RecordingMcu::new(16_000_000.0);
        mcu.set_last_clock(0x1_0000_0010);
        // Forward within the same epoch
        assert_eq!(mcu.clock32_to_clock64(0x20), 0x1_0000_0020);
        // Small step backwards
        assert_eq!(mcu.clock32_to_clock64(0x08), 0x1_0000_0008);
        // Wrapped into the next epoch
        mcu.set_last_clock(0x1_ffff_fff0);
        assert_eq!(mcu.clock32_to_clock64(0x10), 0x2_0000_0010);
    }

    #[test]
    fn clock_conversions() {
        let mut mcu = RecordingMcu::new(16_000_000.0);
        assert_eq!(mcu.seconds_to_clock(0.3), 4_800_000);
        assert_eq!(mcu.clock_to_print_time(8_000_000), 0.5);
        mcu.set_query_base(1_000);
        assert_eq!(mcu.get_query_slot(2), 1_000 + 320_000);
    }

    #[tokio::test]
    async fn deliver_routes_by_name_and_oid() {
        let mut mcu = RecordingMcu::new(16_000_000.0);
        let (tx, mut rx) = mpsc::channel(4);
        mcu.register_msg(THERMOCOUPLE_RESULT, 7, tx);

        let msg = ThermocoupleResult {
            oid: 7,
            next_clock: 1,
            value: 2,
            fault: 0,
        };
        assert!(mcu.deliver(THERMOCOUPLE_RESULT, msg).await);
        assert_eq!(rx.recv().await, Some(msg));

        let other = ThermocoupleResult { oid: 8, ..msg };
        assert!(!mcu.deliver(THERMOCOUPLE_RESULT, other).await);
    }
}
