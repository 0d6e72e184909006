// apps/am_cli/src/commands/mod.rs

//! 子命令

pub mod grid;
pub mod run;
pub mod sr;
pub mod synth;
pub mod worker;
