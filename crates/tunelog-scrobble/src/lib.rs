// SPDX-License-Identifier: GPL-3.0-or-later

//! Client for the external play-history (scrobble) source.
//!
//! This crate fetches a user's recent-tracks stream page by page, with
//! built-in rate limiting and a safety cap on the pagination loop, and
//! exposes the raw played-track records for reconciliation upstream.

pub mod client;
pub mod error;
pub mod models;
pub mod rate_limiter;

pub use client::{ScrobbleClient, ScrobbleClientBuilder};
pub use error::{Result, ScrobbleError};
pub use models::{PlayedTrack, RecentTracksPage};
