pub mod browse;
pub mod error;
pub mod read;
pub mod write;

pub use browse::{exists, read_dir};
pub use error::FsError;
pub use read::{read_file, read_file_with_limit};
pub use write::{mkdir, remove, write_file};
