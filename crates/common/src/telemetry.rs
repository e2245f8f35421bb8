mod config;
mod init;
mod log_correlation;

pub use config::*;
pub use init::*;
pub use log_correlation::*;
