// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![no_std]

//! opml-kernel: the pure, deterministic core of the dispute client.
//!
//! Nothing in this crate performs I/O. It owns the data model (coordinates,
//! snapshots, challenge views), the layer state machine that decides what a
//! role does in a round, and the witness classification logic that turns
//! judge revert reasons into node requests.

extern crate alloc;

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod config;
pub mod error;
pub mod types;
pub mod snapshot;
pub mod witness;
pub mod protocol;
