pub mod b2;
pub mod traits;

pub use b2::B2Storage;
pub use traits::{ObjectStorage, UploadedFile};
