//! Actuation worker (actuator variant).
//!
//! Event-driven: polls the command channel with a short timeout, dispatches
//! on the command tag, and applies the result to the output bank or the
//! status indicator. Unknown command tags and out-of-range channel indices
//! are counted as errors and otherwise ignored — they never crash the
//! worker or stall the channel.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::channel::CommandChannel;
use crate::command::Command;
use crate::config::NodeConfig;
use crate::ports::{IndicatorPort, OutputBank, OUTPUT_CHANNELS};

/// Pause between cycles once the receive wait has elapsed.
const INTER_CYCLE_DELAY: Duration = Duration::from_millis(50);

/// Counters maintained by the actuation worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuateStats {
    /// Commands applied successfully.
    pub processed: u32,
    /// Unknown tags, out-of-range channels, and failed output writes.
    pub errors: u32,
}

/// The actuation worker. Owns the output bank; shares the indicator with
/// the indicator worker.
pub struct ActuationWorker<O: OutputBank, I: IndicatorPort> {
    commands: Arc<CommandChannel>,
    outputs: O,
    indicator: I,
    recv_timeout: Duration,
    stats: ActuateStats,
}

impl<O: OutputBank, I: IndicatorPort> ActuationWorker<O, I> {
    pub fn new(
        commands: Arc<CommandChannel>,
        outputs: O,
        indicator: I,
        config: &NodeConfig,
    ) -> Self {
        Self {
            commands,
            outputs,
            indicator,
            recv_timeout: Duration::from_millis(u64::from(config.command_recv_timeout_ms)),
            stats: ActuateStats::default(),
        }
    }

    /// Drive all outputs to their safe state before accepting commands.
    pub fn init_outputs(&mut self) {
        self.outputs.all_off();
        info!("Actuate: {} output channels ready", OUTPUT_CHANNELS);
    }

    /// Run forever: bounded receive, dispatch, short pause.
    pub fn run(mut self) -> ! {
        self.init_outputs();
        loop {
            self.cycle();
            thread::sleep(INTER_CYCLE_DELAY);
        }
    }

    /// One actuation cycle: receive the next command (or time out and
    /// return), then apply it.
    pub fn cycle(&mut self) {
        let Some(cmd) = self.commands.recv(self.recv_timeout) else {
            return;
        };
        self.apply(cmd);
    }

    pub fn stats(&self) -> ActuateStats {
        self.stats
    }

    /// Current output states (for status rendering and tests).
    pub fn output_states(&self) -> [bool; OUTPUT_CHANNELS] {
        self.outputs.states()
    }

    // ── Internal ──────────────────────────────────────────────

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Gpio { pin, state } => {
                // `pin` is 1-based on the wire.
                if !(1..=OUTPUT_CHANNELS as u8).contains(&pin) {
                    self.stats.errors += 1;
                    warn!("Actuate: invalid channel {pin} (must be 1-{OUTPUT_CHANNELS})");
                    return;
                }
                match self.outputs.set_channel(usize::from(pin) - 1, state) {
                    Ok(()) => {
                        self.stats.processed += 1;
                        info!("Actuate: channel {pin} -> {}", if state { "ON" } else { "OFF" });
                    }
                    Err(e) => {
                        self.stats.errors += 1;
                        warn!("Actuate: channel {pin} write failed: {e}");
                    }
                }
            }
            Command::Neopixel { color } => {
                self.indicator.set_rgb(color);
                self.stats.processed += 1;
                info!("Actuate: indicator colour updated");
            }
            Command::Unknown => {
                self.stats.errors += 1;
                warn!("Actuate: unknown command type ignored");
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
