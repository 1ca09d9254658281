// src/lib.rs
pub mod pos;
pub mod consensus;
pub mod config;
pub mod devnet;
