//! Turn assembly: merges streamed deltas into a typed response.

pub mod assembler;
pub mod entries;
pub mod parsed;

pub use assembler::{ResponseAssembler, SessionSnapshot};
pub use entries::{ArtifactEntry, ToolCallEntry, ToolResultEntry, parse_arguments};
pub use parsed::{ParsedResponse, ResponseValue, UntaggedText};
