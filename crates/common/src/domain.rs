mod device;
mod fleet_telemetry;
mod in_memory_fleet_telemetry_repository;
mod reconciliation;
mod result;
mod telemetry_record;

pub use device::*;
pub use fleet_telemetry::*;
pub use in_memory_fleet_telemetry_repository::*;
pub use reconciliation::*;
pub use result::*;
pub use telemetry_record::*;
