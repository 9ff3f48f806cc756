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
use std::sync::Arc;
use tracing::info;

use crate::config::RedlockConfig;
use crate::connection::{Instance, RedisInstance};
use crate::errors::RedlockResult;
use crate::lock::Mutex;
use crate::util::{jitter_delay, num_milliseconds};

/// Factory for distributed mutexes over one fixed set of independent Redis
/// instances.
///
/// The client owns one connection pool per instance; every mutex it hands
/// out shares those pools and starts from the configured defaults.
pub struct RedlockClient {
    config: RedlockConfig,
    instances: Vec<Arc<dyn Instance>>,
    pools: Vec<Arc<RedisInstance>>,
}

impl RedlockClient {
    pub fn new(config: RedlockConfig) -> RedlockResult<Self> {
        config.validate()?;

        let mut pools = Vec::with_capacity(config.servers.len());
        for url in &config.servers {
            pools.push(Arc::new(RedisInstance::connect(url, &config)?));
        }
        let instances = pools
            .iter()
            .map(|pool| Arc::clone(pool) as Arc<dyn Instance>)
            .collect();

        info!(instances = config.servers.len(), quorum = config.effective_quorum(), "redlock client ready");
        Ok(Self {
            config,
            instances,
            pools,
        })
    }

    /// Creates a mutex for `name` with this client's defaults. Tune a single
    /// mutex with its `with_*` builder methods.
    pub fn get_mutex(&self, name: &str) -> Mutex {
        let retry_delay = self.config.retry_delay;
        let jitter_ms = num_milliseconds(self.config.retry_jitter);

        let mut mutex = Mutex::new(name, self.instances.clone())
            .with_expiry(self.config.expiry)
            .with_tries(self.config.tries)
            .with_drift_factor(self.config.drift_factor)
            .with_delay_fn(Arc::new(move |_attempt| {
                jitter_delay(retry_delay, jitter_ms)
            }));
        if let Some(quorum) = self.config.quorum {
            mutex = mutex.with_quorum(quorum);
        }
        mutex
    }

    /// Number of instances currently answering PING; a count below quorum
    /// means lock() cannot succeed right now.
    pub fn healthy_instance_count(&self) -> usize {
        self.pools
            .iter()
            .filter(|pool| pool.health_check())
            .count()
    }

    pub fn config(&self) -> &RedlockConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::errors::RedlockError;

    #[test]
    fn rejects_empty_server_list() {
        match RedlockClient::new(RedlockConfig::default()) {
            Err(RedlockError::ConfigError(_)) => {}
            other => panic!("expected ConfigError, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rejects_malformed_server_url() {
        let config = RedlockConfig::new(vec!["not a url"]);
        assert!(RedlockClient::new(config).is_err());
    }

    #[test]
    fn builds_mutexes_with_configured_defaults() {
        // Pools are lazy, so construction succeeds without live servers.
        let config = RedlockConfig::new(vec![
            "redis://127.0.0.1:6379",
            "redis://127.0.0.1:6380",
            "redis://127.0.0.1:6381",
        ])
        .with_expiry(Duration::from_secs(2))
        .with_tries(4);

        let client = RedlockClient::new(config).unwrap();
        let mutex = client.get_mutex("orders:refund");
        assert_eq!(mutex.name(), "orders:refund");
        assert!(mutex.until().is_none());
    }
}
