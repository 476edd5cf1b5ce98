/// The commands module, which handles the `run`, `check`, and `tokens` subcommands.
pub mod commands;
