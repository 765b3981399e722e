// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tokengate core
//!
//! Issues and verifies HMAC-signed access tokens carried in email, and decides
//! whether an inbound message is trustworthy enough to act on.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Token codec, certificate trust, message authenticity and the
//!   submission validation pipeline that ties them together

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
