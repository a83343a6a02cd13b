// Domain layer: core models and ports (interfaces) shared by the sorting engine and the CLI.

pub mod model;
pub mod ports;
