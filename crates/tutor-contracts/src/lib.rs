//! Shared types for the study pipeline: subjects, requests, the declared
//! response schema and its validator, display tabs, the session journal and
//! chat command parsing.

pub mod chat;
pub mod events;
pub mod providers;
pub mod request;
pub mod response;
pub mod schema;
pub mod subject;
pub mod tabs;

pub use providers::{GenerationError, StudyProvider};
pub use request::{EncodedImage, RequestError, StudyRequest};
pub use response::{ParseError, SchemaViolation, StudyResponse, ViolationKind};
pub use subject::Subject;
pub use tabs::DisplayTab;
