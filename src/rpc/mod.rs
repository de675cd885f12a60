//! File RPC Surface (§4.6, §6). TCP-based remote procedures over the file
//! port: Put, Get, Delete, LS, GetVersions, SendFile.

pub mod client;
pub mod server;
mod wire;

pub use client::CallReport;
pub use wire::{Request, Response};
