/// Platform-specific functionality — enumeration of mounted volumes.

pub mod drives;

#[cfg(windows)]
pub use drives::enumerate_drives;
pub use drives::{classify_drives, DriveType, MountedDrive};
