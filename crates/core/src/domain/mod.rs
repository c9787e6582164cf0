mod batch;
mod booklet;
mod error_kind;
mod finding;
mod outbox;
mod record;

pub use batch::ErrorBatch;
pub use booklet::ResearchBooklet;
pub use error_kind::{CompilerError, ErrorLocation, Severity};
pub use finding::{AIResearchFinding, Stage};
pub use outbox::{OutboxMessage, Topic};
pub use record::{FailureReason, FileProcessingRecord, FileState};
