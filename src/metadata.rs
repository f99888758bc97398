//! Metadata-region exhaustion generator
//!
//! Exploits the fact that a registered code unit is unique to the loader
//! unit that defined it: defining the same payload bytes through many
//! isolated loader units yields many independent copies in the metadata
//! region. The loop is unpaced so the (typically much smaller) region fills
//! quickly.

use crate::error::{OomgenError, Result, RunExit};
use crate::monitor::MetadataRegionMonitor;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One runtime-registered copy of a code definition.
///
/// Equality is identity, never value: two units registered from identical
/// bytes are distinct, each holding its own copy of the definition.
/// Definitions are never interned or deduplicated.
#[derive(Debug)]
pub struct CodeUnit {
    id: uuid::Uuid,
    bytes: Box<[u8]>,
}

impl CodeUnit {
    fn register(bytes: Vec<u8>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            bytes: bytes.into_boxed_slice(),
        }
    }

    /// Opaque identity of this registered unit
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Metadata-region bytes this registration occupies
    pub fn footprint(&self) -> usize {
        self.bytes.len()
    }
}

impl PartialEq for CodeUnit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CodeUnit {}

/// An isolated namespace capable of defining exactly one code unit
pub struct LoaderUnit {
    payload_path: Arc<PathBuf>,
    defined: Option<CodeUnit>,
}

impl LoaderUnit {
    fn new(payload_path: Arc<PathBuf>) -> Self {
        Self {
            payload_path,
            defined: None,
        }
    }

    /// Define this unit's single code unit from the payload bytes.
    ///
    /// A unit defines at most once in its lifetime; further calls are
    /// no-ops. The payload is opaque, so the only structural requirement is
    /// that it is readable and non-empty.
    pub fn define(&mut self) -> Result<()> {
        if self.defined.is_some() {
            return Ok(());
        }

        let bytes =
            std::fs::read(&*self.payload_path).map_err(|source| OomgenError::PayloadRead {
                path: (*self.payload_path).clone(),
                source,
            })?;
        if bytes.is_empty() {
            return Err(OomgenError::PayloadMalformed((*self.payload_path).clone()));
        }

        self.defined = Some(CodeUnit::register(bytes));
        Ok(())
    }

    /// The code unit this loader defined, if any
    pub fn code_unit(&self) -> Option<&CodeUnit> {
        self.defined.as_ref()
    }

    fn footprint(&self) -> usize {
        self.defined.as_ref().map_or(0, CodeUnit::footprint)
    }
}

/// Metadata exhaustion generator
///
/// Owns an append-only collection of [`LoaderUnit`]s, permanently retaining
/// every defined code unit and its metadata footprint. If no region monitor
/// handle was available at construction, the generator runs with reporting
/// permanently disabled; that is the only degraded mode and it is never
/// fatal.
pub struct MetadataExhaustionGenerator<W: Write> {
    report_period: usize,
    sink: W,
    payload_path: Arc<PathBuf>,
    monitor: Option<MetadataRegionMonitor>,
    units: Vec<LoaderUnit>,
    report_counter: usize,
}

impl<W: Write> MetadataExhaustionGenerator<W> {
    /// Create a new metadata exhaustion generator.
    ///
    /// `monitor` is the result of a one-time capability probe
    /// ([`crate::monitor::probe_metadata_region`]); pass `None` when the
    /// region cannot be observed.
    pub fn new(
        report_period: usize,
        sink: W,
        payload_path: PathBuf,
        monitor: Option<MetadataRegionMonitor>,
    ) -> Self {
        if monitor.is_none() {
            warn!("metadata region monitor not found, usage reporting disabled");
        }
        debug!(
            report_period,
            payload = %payload_path.display(),
            "creating metadata exhaustion generator"
        );
        Self {
            report_period,
            sink,
            payload_path: Arc::new(payload_path),
            monitor,
            units: Vec::new(),
            report_counter: 0,
        }
    }

    /// The loader units appended so far, oldest first
    pub fn units(&self) -> &[LoaderUnit] {
        &self.units
    }

    /// Advance the generator by one tick: define one fresh copy of the
    /// payload through a new loader unit and retain it forever.
    pub fn tick(&mut self) -> Result<()> {
        let mut unit = LoaderUnit::new(Arc::clone(&self.payload_path));
        unit.define()?;

        if let Some(monitor) = &self.monitor {
            monitor.record_definition(unit.footprint() as u64);
        }
        self.units.push(unit);

        self.report_counter += 1;
        if let Some(monitor) = &self.monitor {
            if self.report_period > 0 && self.report_counter == self.report_period {
                writeln!(self.sink, "Current metadata size: {}", monitor.used_bytes())?;
                writeln!(self.sink, "============================")?;
                self.report_counter = 0;
            }
        }

        Ok(())
    }

    /// Run ticks until a fatal definition error.
    ///
    /// No pacing and no cancellation path: the loop runs flat out until the
    /// payload becomes unreadable or the allocator aborts the process.
    pub fn run(&mut self) -> RunExit {
        info!("overfilling the metadata region");
        loop {
            if let Err(e) = self.tick() {
                error!(error = %e, units = self.units.len(), "definition failed, aborting run");
                return RunExit::Fatal(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn payload_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_identical_bytes_yield_distinct_units() {
        let payload = payload_file(b"\xca\xfe\xba\xbe waste class");
        let path = Arc::new(payload.path().to_path_buf());

        let mut a = LoaderUnit::new(Arc::clone(&path));
        let mut b = LoaderUnit::new(Arc::clone(&path));
        a.define().unwrap();
        b.define().unwrap();

        let (ua, ub) = (a.code_unit().unwrap(), b.code_unit().unwrap());
        assert_ne!(ua.id(), ub.id());
        assert_ne!(ua, ub);
        // Independent copies, not a shared allocation
        assert!(!std::ptr::eq(ua.bytes.as_ptr(), ub.bytes.as_ptr()));
        assert_eq!(ua.bytes, ub.bytes);
    }

    #[test]
    fn test_loader_defines_at_most_once() {
        let payload = payload_file(b"payload");
        let mut unit = LoaderUnit::new(Arc::new(payload.path().to_path_buf()));

        unit.define().unwrap();
        let first_id = unit.code_unit().unwrap().id();
        unit.define().unwrap();
        assert_eq!(unit.code_unit().unwrap().id(), first_id);
    }

    #[test]
    fn test_unreadable_payload_is_fatal() {
        let mut unit = LoaderUnit::new(Arc::new(PathBuf::from("/nonexistent/unit.bin")));
        let err = unit.define().unwrap_err();
        assert!(matches!(err, OomgenError::PayloadRead { .. }));
    }

    #[test]
    fn test_empty_payload_is_malformed() {
        let payload = payload_file(b"");
        let mut unit = LoaderUnit::new(Arc::new(payload.path().to_path_buf()));
        let err = unit.define().unwrap_err();
        assert!(matches!(err, OomgenError::PayloadMalformed(_)));
        assert!(unit.code_unit().is_none());
    }

    #[test]
    fn test_monitor_accumulates_footprints() {
        let payload = payload_file(&[7u8; 10]);
        let monitor = MetadataRegionMonitor::new();
        let mut gen = MetadataExhaustionGenerator::new(
            0,
            Vec::new(),
            payload.path().to_path_buf(),
            Some(monitor.clone()),
        );

        for _ in 0..3 {
            gen.tick().unwrap();
        }
        assert_eq!(monitor.used_bytes(), 30);
    }

    #[test]
    fn test_report_cadence_with_monitor() {
        let payload = payload_file(b"unit");
        let mut gen = MetadataExhaustionGenerator::new(
            2,
            Vec::new(),
            payload.path().to_path_buf(),
            Some(MetadataRegionMonitor::new()),
        );

        for _ in 0..5 {
            gen.tick().unwrap();
        }

        let out = String::from_utf8(gen.sink.clone()).unwrap();
        assert_eq!(
            out.matches("Current metadata size: ").count(),
            2,
            "reports at ticks 2 and 4 only"
        );
    }

    #[test]
    fn test_absent_monitor_disables_reporting_but_not_generation() {
        let payload = payload_file(b"unit");
        let mut gen =
            MetadataExhaustionGenerator::new(2, Vec::new(), payload.path().to_path_buf(), None);

        for _ in 0..10 {
            gen.tick().unwrap();
        }
        assert_eq!(gen.units().len(), 10);
        assert!(gen.sink.is_empty());
    }
}
