#![forbid(unsafe_code)]

pub mod checksum;
pub mod document;
pub mod ids;
pub mod jsonld;
pub mod path;
pub mod timestamp;

pub use checksum::{checksum, java_string_hash};
pub use document::{Document, DocumentError, Link, RecordStatus, TypedIdentifier};
pub use ids::{BaseUri, BaseUriError, generate_id};
pub use jsonld::FramingError;
pub use path::{ContainerKind, Path, PathError, PathStep};
