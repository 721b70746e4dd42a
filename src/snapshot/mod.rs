//! Local snapshot files: the pushed source, the optional reference baseline
//! and reference rotation after a successful push

pub mod reference;
pub mod rotate;
pub mod source;

pub use reference::ReferenceSnapshot;
pub use rotate::rotate_reference;
pub use source::SourceFile;
