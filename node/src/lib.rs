// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod judge;
pub mod network;
pub mod engine;
pub mod persistence;
pub mod provider;
pub mod resolver;
pub mod round;
pub mod session;
