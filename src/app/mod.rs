// Application layer: one handler per subcommand, wired to concrete adapters by the binary.

pub mod configure;
pub mod track;
