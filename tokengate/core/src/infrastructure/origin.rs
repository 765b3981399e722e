// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Origin-IP allow-list check.
//!
//! A message may carry the origin header once per relay, so every occurrence
//! is tested. Some mail agents wrap the address in brackets.

use ipnetwork::IpNetwork;
use std::net::IpAddr;
use tracing::{debug, warn};

use crate::domain::dataset_settings::DatasetSettings;
use crate::infrastructure::mime;

pub const DEFAULT_ORIGIN_HEADER: &str = "X-Originating-IP";

#[derive(Debug, Clone)]
pub struct OriginValidator {
    header: String,
}

impl Default for OriginValidator {
    fn default() -> Self {
        Self::new(DEFAULT_ORIGIN_HEADER)
    }
}

impl OriginValidator {
    pub fn new(header: impl Into<String>) -> Self {
        Self { header: header.into() }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    /// Addresses declared by the origin header, in message order.
    pub fn originating_ips(&self, message: &[u8]) -> Vec<IpAddr> {
        mime::header_values(message, &self.header)
            .iter()
            .filter_map(|value| {
                let candidate = value.trim().trim_start_matches('[').trim_end_matches(']').trim();
                match candidate.parse::<IpAddr>() {
                    Ok(ip) => Some(ip),
                    Err(_) => {
                        warn!(header = %self.header, value = %value, "Unparseable originating address");
                        None
                    }
                }
            })
            .collect()
    }

    /// True when some declared address falls inside some subnet. An absent
    /// header or an empty subnet list never matches.
    pub fn is_originating_ip_in_subnets(&self, message: &[u8], subnets: &[String]) -> bool {
        let ips = self.originating_ips(message);
        if ips.is_empty() {
            debug!(header = %self.header, "No originating address in message");
            return false;
        }

        for subnet in subnets {
            let Ok(net) = subnet.trim().parse::<IpNetwork>() else {
                warn!(subnet = %subnet, "Skipping malformed subnet");
                continue;
            };
            if let Some(ip) = ips.iter().find(|ip| net.contains(**ip)) {
                debug!(ip = %ip, subnet = %net, "Originating address allowed");
                return true;
            }
        }
        false
    }

    /// Tenant policy: no subnets configured means no restriction.
    pub fn is_origin_allowed(&self, message: &[u8], settings: &DatasetSettings) -> bool {
        !settings.requires_origin_validation()
            || self.is_originating_ip_in_subnets(message, &settings.allowed_subnets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identifiers::TeamId;

    fn message(origin: Option<&str>) -> Vec<u8> {
        let mut raw = String::from("From: approver@example.org\n");
        if let Some(ip) = origin {
            raw.push_str(&format!("X-Originating-IP: {ip}\n"));
        }
        raw.push_str("Subject: token\n\nbody\n");
        raw.into_bytes()
    }

    fn subnets() -> Vec<String> {
        vec!["156.40.0.0/16".to_string()]
    }

    #[test]
    fn test_address_inside_subnet_passes() {
        let validator = OriginValidator::default();
        assert!(validator.is_originating_ip_in_subnets(&message(Some("156.40.12.9")), &subnets()));
        assert!(validator.is_originating_ip_in_subnets(&message(Some("[156.40.12.9]")), &subnets()));
    }

    #[test]
    fn test_address_outside_subnet_or_missing_fails() {
        let validator = OriginValidator::default();
        assert!(!validator.is_originating_ip_in_subnets(&message(Some("200.1.1.1")), &subnets()));
        assert!(!validator.is_originating_ip_in_subnets(&message(None), &subnets()));
        assert!(!validator.is_originating_ip_in_subnets(&message(Some("not an ip")), &subnets()));
    }

    #[test]
    fn test_any_relay_hop_may_match() {
        let raw = b"X-Originating-IP: [10.1.1.1]\nX-Originating-IP: [156.40.1.1]\n\nbody";
        assert!(OriginValidator::default().is_originating_ip_in_subnets(raw, &subnets()));
    }

    #[test]
    fn test_malformed_subnet_is_skipped() {
        let subnets = vec!["bogus".to_string(), "156.40.0.0/16".to_string()];
        assert!(OriginValidator::default().is_originating_ip_in_subnets(&message(Some("156.40.0.1")), &subnets));
    }

    #[test]
    fn test_tenant_without_subnets_is_unrestricted() {
        let validator = OriginValidator::default();
        let mut settings = DatasetSettings::new(TeamId(1), []);
        assert!(validator.is_origin_allowed(&message(None), &settings));
        assert!(!validator.is_originating_ip_in_subnets(&message(Some("156.40.0.1")), &[]));

        settings.allowed_subnets = subnets();
        assert!(!validator.is_origin_allowed(&message(None), &settings));
        assert!(validator.is_origin_allowed(&message(Some("156.40.0.1")), &settings));
    }

    #[test]
    fn test_custom_header_name() {
        let validator = OriginValidator::new("X-Client-IP");
        let raw = b"X-Client-IP: 156.40.3.3\n\nbody";
        assert!(validator.is_originating_ip_in_subnets(raw, &subnets()));
    }
}
