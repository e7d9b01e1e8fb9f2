// Domain layer: pricing models, the service catalog and ports (interfaces).
// No external dependencies beyond std/serde/async-trait.

pub mod model;
pub mod ports;

pub mod services;
