// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Garsync: selective Garmin-to-Strava activity sync.
//!
//! This crate fetches recent activities from Garmin Connect, filters them
//! by activity type, downloads the original FIT recording, uploads it to
//! Strava, and records every decision in a local SQLite ledger so that
//! repeated runs never transfer the same activity twice.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;
