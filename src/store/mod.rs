//! Persistence layer: libSQL-backed storage for submissions and their records.

pub mod libsql_backend;
pub mod migrations;
pub mod model;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use model::{
    EducationEvent, EmailLog, EmailLogStatus, Feedback, FeedbackPatch, NewEducationEvent,
    NewEmailLog, NewSubmission, Retention, RetentionPatch, Submission, SubmissionPatch,
};
pub use traits::Database;
