// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application
//!
//! Use cases built from the domain contracts and infrastructure adapters.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Validate inbound approval submissions and compose outbound tokens

pub mod submission_validation;
pub mod token_issuance;

pub use submission_validation::SubmissionValidationService;
pub use token_issuance::{IssuedToken, TokenIssuanceService};
