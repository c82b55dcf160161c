pub mod document_type;
pub mod extraction;

pub use document_type::*;
pub use extraction::*;
