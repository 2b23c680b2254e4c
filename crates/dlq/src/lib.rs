//! Dead-letter sink for events whose processing exhausted retries.
//!
//! Two layers: an in-memory ring that fans records out to subscribers, and
//! the authoritative `error_logs` table that operators work from. The ring
//! is bounded and lossy under pressure; the table is not.

pub mod error;
pub mod record;
pub mod sink;
pub mod store;

pub use error::{DlqError, Result};
pub use record::{DeadLetterRecord, ErrorType};
pub use sink::{DeadLetterHandler, DeadLetterQueue, DeadLetterSink};
pub use store::{ErrorLogEntry, ErrorLogPersister, ErrorLogStore, InMemoryErrorLogStore, PostgresErrorLogStore};
