pub mod record;

pub use record::{QuestionRecord, RecordPatch, RecordState, SessionId};
