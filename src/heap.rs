//! Heap-region exhaustion generator
//!
//! Fills the general-purpose heap with a steady stream of paired blocks: a
//! permanently retained half and a half that is periodically released for
//! reclamation. Net usage grows every tick until the allocator gives up and
//! aborts the process, which is the point.

use crate::error::{Result, RunExit};
use crate::monitor::HeapRegionMonitor;
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Fixed element size; block sizes are supplied in bytes and allocated as u32s
const ELEMENT_SIZE: usize = std::mem::size_of::<u32>();

/// Fill pattern for fresh blocks, so pages are committed rather than reserved
const FILL_PATTERN: u32 = 0x5757_5757;

/// Fixed pacing suspension between ticks
const TICK_PACING: Duration = Duration::from_millis(1);

/// One tick's worth of manufactured garbage
pub struct Waster {
    unrecoverable: Vec<u32>,
    recoverable: Option<Vec<u32>>,
}

impl Waster {
    fn new(unrecoverable_len: usize, recoverable_len: usize) -> Self {
        Self {
            unrecoverable: vec![FILL_PATTERN; unrecoverable_len],
            recoverable: Some(vec![FILL_PATTERN; recoverable_len]),
        }
    }

    /// Release the recoverable half. Once cleared it is never re-populated;
    /// the Waster is immutable garbage from here on.
    fn recover(&mut self) {
        self.recoverable = None;
    }

    pub fn is_recovered(&self) -> bool {
        self.recoverable.is_none()
    }

    /// Retained bytes: the unrecoverable half plus the recoverable half
    /// while it is still held.
    pub fn retained_bytes(&self) -> usize {
        let recoverable = self.recoverable.as_ref().map_or(0, Vec::len);
        (self.unrecoverable.len() + recoverable) * ELEMENT_SIZE
    }
}

/// Heap exhaustion generator
///
/// Owns an append-only collection of [`Waster`]s; the collection never
/// shrinks. Unbounded growth is the exhaustion mechanism, so do not bound
/// it. A `report_period` or `recover_period` of zero disables the
/// corresponding periodic action.
pub struct HeapExhaustionGenerator<W: Write> {
    unrecoverable_per_tick: usize,
    recoverable_per_tick: usize,
    report_period: usize,
    recover_period: usize,
    sink: W,
    monitor: HeapRegionMonitor,
    cancel: CancellationToken,
    wasters: Vec<Waster>,
    report_counter: usize,
    recover_counter: usize,
}

impl<W: Write> HeapExhaustionGenerator<W> {
    /// Create a new heap exhaustion generator.
    ///
    /// Per-tick amounts are given in bytes and converted to element counts
    /// using the fixed 4-byte element size. Periods are tick counts.
    pub fn new(
        unrecoverable_bytes_per_tick: usize,
        recoverable_bytes_per_tick: usize,
        report_period: usize,
        recover_period: usize,
        sink: W,
        monitor: HeapRegionMonitor,
        cancel: CancellationToken,
    ) -> Self {
        debug!(
            unrecoverable_bytes_per_tick,
            recoverable_bytes_per_tick,
            report_period,
            recover_period,
            "creating heap exhaustion generator"
        );
        Self {
            unrecoverable_per_tick: unrecoverable_bytes_per_tick / ELEMENT_SIZE,
            recoverable_per_tick: recoverable_bytes_per_tick / ELEMENT_SIZE,
            report_period,
            recover_period,
            sink,
            monitor,
            cancel,
            wasters: Vec::new(),
            report_counter: 0,
            recover_counter: 0,
        }
    }

    /// The wasters appended so far, oldest first
    pub fn wasters(&self) -> &[Waster] {
        &self.wasters
    }

    /// Advance the generator by one tick: allocate, maybe recover, maybe
    /// report. Pacing is the caller's concern.
    pub fn tick(&mut self) -> Result<()> {
        self.wasters.push(Waster::new(
            self.unrecoverable_per_tick,
            self.recoverable_per_tick,
        ));
        self.monitor.record_allocation(
            ((self.unrecoverable_per_tick + self.recoverable_per_tick) * ELEMENT_SIZE) as u64,
        );

        self.recover_counter += 1;
        if self.recover_period > 0 && self.recover_counter == self.recover_period {
            self.recover_trailing_window();
            self.recover_counter = 0;
        }

        self.report_counter += 1;
        if self.report_period > 0 && self.report_counter == self.report_period {
            self.report()?;
            self.report_counter = 0;
        }

        Ok(())
    }

    /// Clear the recoverable half of exactly the `recover_period` most
    /// recently appended wasters. Sweep windows are contiguous and never
    /// overlap, so every entry in the window still holds its block.
    fn recover_trailing_window(&mut self) {
        let start = self.wasters.len() - self.recover_period;
        let freed = (self.recover_period * self.recoverable_per_tick * ELEMENT_SIZE) as u64;
        for waster in &mut self.wasters[start..] {
            waster.recover();
        }
        self.monitor.record_reclaim(freed);
        debug!(
            window = self.recover_period,
            total = self.wasters.len(),
            "released trailing recovery window"
        );
    }

    fn report(&mut self) -> Result<()> {
        let usage = self.monitor.usage();
        writeln!(self.sink, "Current heap size: {}", usage.current)?;
        writeln!(self.sink, "Maximum heap size: {}", usage.maximum)?;
        writeln!(self.sink, "Free heap size: {}", usage.free)?;
        writeln!(self.sink, "============================")?;
        Ok(())
    }

    /// Run ticks until cancellation or a fatal sink error.
    ///
    /// Actual heap exhaustion is not observable from inside the loop: the
    /// allocator aborts the process, which is this generator's designed
    /// output. Cancellation is only observed at the pacing suspension.
    pub async fn run(&mut self) -> RunExit {
        info!("overfilling the heap region");
        loop {
            if let Err(e) = self.tick() {
                return RunExit::Fatal(e);
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    // Cancellation stays a clean exit even if the sink is
                    // gone; the lost notice is only worth a debug line
                    if let Err(e) = writeln!(self.sink, "Exhaustion run was interrupted. Stopping.") {
                        debug!(error = %e, "could not write interruption notice to sink");
                    }
                    info!(ticks = self.wasters.len(), "heap exhaustion cancelled cleanly");
                    return RunExit::Cancelled;
                }
                _ = tokio::time::sleep(TICK_PACING) => {}
            }
        }
    }
}
