mod directory;
mod domain;
mod fleet_poller;
mod https;

pub use directory::*;
pub use domain::*;
pub use fleet_poller::*;
pub use https::*;
