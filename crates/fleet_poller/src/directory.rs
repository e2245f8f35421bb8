mod file_device_directory;

pub use file_device_directory::*;
