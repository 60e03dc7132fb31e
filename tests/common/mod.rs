//! Integration test common infrastructure.
//!
//! Provides an in-process server, a spawned daemon process and a small JSON
//! client for driving either.

#![allow(dead_code)]

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::{DaemonProcess, TestServer};
