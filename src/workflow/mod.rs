pub mod pending_queue;
pub mod question_ledger;

pub use pending_queue::PendingQueue;
pub use question_ledger::{LedgerLimits, QuestionLedger};
