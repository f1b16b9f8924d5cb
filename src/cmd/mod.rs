//! Daemon entry point. `golypus` has exactly one command — the root
//! daemon loop — so there is no subcommand enum here, unlike the
//! teacher's multi-command CLI.

pub mod root;
