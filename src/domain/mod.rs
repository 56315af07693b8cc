// Domain layer: bag models and ports. Storage details live in adapters.

pub mod model;
pub mod ports;
