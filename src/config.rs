/*
 *
 *  *
 *  *      Copyright (c) 2018-2025, SnackCloud All rights reserved.
 *  *
 *  *   Redistribution and use in source and binary forms, with or without
 *  *   modification, are permitted provided that the following conditions are met:
 *  *
 *  *   Redistributions of source code must retain the above copyright notice,
 *  *   this list of conditions and the following disclaimer.
 *  *   Redistributions in binary form must reproduce the above copyright
 *  *   notice, this list of conditions and the following disclaimer in the
 *  *   documentation and/or other materials provided with the distribution.
 *  *   Neither the name of the www.snackcloud.cn developer nor the names of its
 *  *   contributors may be used to endorse or promote products derived from
 *  *   this software without specific prior written permission.
 *  *   Author: SnackCloud
 *  *
 *
 */
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{RedlockError, RedlockResult};
use crate::util::calculate_quorum;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedlockConfig {
    /// One URL per independent Redis instance, e.g. `redis://10.0.0.1:6379`.
    /// The instances must not replicate each other.
    pub servers: Vec<String>,
    /// Connection pool size per instance
    pub pool_size: u32,
    /// Connection acquisition timeout per instance
    pub connection_timeout: Duration,
    /// User name
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Database number
    pub database: Option<i64>,
    /// Lease duration written to each instance
    pub expiry: Duration,
    /// Maximum acquisition attempts per lock() call
    pub tries: u32,
    /// Fixed delay between acquisition attempts
    pub retry_delay: Duration,
    /// Maximum jitter applied around `retry_delay`
    pub retry_jitter: Duration,
    /// Fraction of `expiry` reserved as clock-drift budget
    pub drift_factor: f64,
    /// Quorum override; `None` means strict majority
    pub quorum: Option<usize>,
}

impl Default for RedlockConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            pool_size: 10,
            connection_timeout: Duration::from_secs(3),
            username: None,
            password: None,
            database: None,
            expiry: Duration::from_secs(8),
            tries: 32,
            retry_delay: Duration::from_millis(500),
            retry_jitter: Duration::from_millis(50),
            drift_factor: 0.01,
            quorum: None,
        }
    }
}

impl RedlockConfig {
    pub fn new<S: Into<String>>(servers: Vec<S>) -> Self {
        Self {
            servers: servers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_database(mut self, db: i64) -> Self {
        self.database = Some(db);
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_tries(mut self, tries: u32) -> Self {
        self.tries = tries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_retry_jitter(mut self, jitter: Duration) -> Self {
        self.retry_jitter = jitter;
        self
    }

    pub fn with_drift_factor(mut self, factor: f64) -> Self {
        self.drift_factor = factor;
        self
    }

    pub fn with_quorum(mut self, quorum: usize) -> Self {
        self.quorum = Some(quorum);
        self
    }

    /// Effective quorum for this configuration.
    pub fn effective_quorum(&self) -> usize {
        self.quorum.unwrap_or_else(|| calculate_quorum(self.servers.len()))
    }

    pub(crate) fn validate(&self) -> RedlockResult<()> {
        if self.servers.is_empty() {
            return Err(RedlockError::ConfigError(
                "at least one Redis instance is required".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(RedlockError::ConfigError(
                "pool size cannot be zero".to_string(),
            ));
        }
        if self.expiry.is_zero() {
            return Err(RedlockError::ConfigError(
                "lock expiry must be positive".to_string(),
            ));
        }
        if self.tries == 0 {
            return Err(RedlockError::ConfigError(
                "at least one acquisition attempt is required".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.drift_factor) {
            return Err(RedlockError::ConfigError(format!(
                "drift factor {} must be in [0, 1)",
                self.drift_factor
            )));
        }
        if let Some(quorum) = self.quorum {
            if quorum == 0 || quorum > self.servers.len() {
                return Err(RedlockError::ConfigError(format!(
                    "quorum {} out of range for {} instance(s)",
                    quorum,
                    self.servers.len()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_recommendations() {
        let config = RedlockConfig::default();
        assert_eq!(config.expiry, Duration::from_secs(8));
        assert_eq!(config.tries, 32);
        assert_eq!(config.retry_delay, Duration::from_millis(500));
        assert_eq!(config.drift_factor, 0.01);
        assert!(config.quorum.is_none());
    }

    #[test]
    fn quorum_defaults_to_majority() {
        let config = RedlockConfig::new(vec!["redis://a", "redis://b", "redis://c"]);
        assert_eq!(config.effective_quorum(), 2);
        assert_eq!(config.with_quorum(3).effective_quorum(), 3);
    }

    #[test]
    fn validation_rejects_degenerate_configs() {
        assert!(RedlockConfig::default().validate().is_err());

        let base = RedlockConfig::new(vec!["redis://a", "redis://b", "redis://c"]);
        assert!(base.validate().is_ok());
        assert!(base.clone().with_expiry(Duration::ZERO).validate().is_err());
        assert!(base.clone().with_tries(0).validate().is_err());
        assert!(base.clone().with_drift_factor(1.0).validate().is_err());
        assert!(base.clone().with_drift_factor(-0.1).validate().is_err());
        assert!(base.clone().with_quorum(0).validate().is_err());
        assert!(base.clone().with_quorum(4).validate().is_err());
        assert!(base.with_pool_size(0).validate().is_err());
    }
}
