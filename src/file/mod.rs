pub mod clock;
pub mod codec;
pub mod error;
pub mod id;
pub mod storage;

pub use error::StoreError;
pub use storage::{FileResult, FileStorage};
