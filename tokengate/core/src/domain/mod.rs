// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Value objects, aggregates and collaborator contracts for token-based
//! access approval.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Types shared by the codec, the trust checks and the pipeline

pub mod identifiers;
pub mod dataset_settings;
pub mod token;
pub mod submission;
pub mod collaborators;
pub mod config;
