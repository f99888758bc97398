//! Oomgen - Deliberate Out-of-Memory Generator
//!
//! A tool that drives its own process to resource exhaustion in one of two
//! independent memory regions, so an operator (usually with a profiler
//! attached) can watch growth, reclamation, and failure semantics as the
//! region fills:
//! - **Heap region**: paced allocation of paired blocks, with a bounded
//!   trailing window periodically released for reclamation
//! - **Metadata region**: unpaced registration of independent copies of one
//!   fixed code unit definition through isolated loader units
//!
//! Exactly one generator runs per process. Exhaustion is reached when the
//! allocator aborts the process; that abort is the tool's designed output
//! and is deliberately left unhandled.
//!
//! # Example
//!
//! ```ignore
//! use oomgen::{HeapExhaustionGenerator, HeapRegionMonitor};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cancel = CancellationToken::new();
//!     let mut generator = HeapExhaustionGenerator::new(
//!         10240, 20480, 2000, 1000,
//!         std::io::stdout(),
//!         HeapRegionMonitor::new(),
//!         cancel,
//!     );
//!     let exit = generator.run().await;
//!     println!("run ended: {:?}", exit);
//! }
//! ```

pub mod error;
pub mod heap;
pub mod metadata;
pub mod monitor;

// Re-export commonly used types
pub use error::{OomgenError, Result, RunExit};
pub use heap::{HeapExhaustionGenerator, Waster};
pub use metadata::{CodeUnit, LoaderUnit, MetadataExhaustionGenerator};
pub use monitor::{probe_metadata_region, HeapRegionMonitor, HeapUsage, MetadataRegionMonitor};
