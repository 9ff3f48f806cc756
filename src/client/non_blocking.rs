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
use crate::connection::{AsyncInstance, AsyncRedisInstance};
use crate::errors::RedlockResult;
use crate::lock::AsyncMutex;
use crate::util::{jitter_delay, num_milliseconds};

/// Async factory for distributed mutexes; the tokio-flavored counterpart of
/// [`RedlockClient`](crate::RedlockClient).
pub struct AsyncRedlockClient {
    config: RedlockConfig,
    instances: Vec<Arc<dyn AsyncInstance>>,
    pools: Vec<Arc<AsyncRedisInstance>>,
}

impl AsyncRedlockClient {
    pub fn new(config: RedlockConfig) -> RedlockResult<Self> {
        config.validate()?;

        let mut pools = Vec::with_capacity(config.servers.len());
        for url in &config.servers {
            pools.push(Arc::new(AsyncRedisInstance::connect(url, &config)?));
        }
        let instances = pools
            .iter()
            .map(|pool| Arc::clone(pool) as Arc<dyn AsyncInstance>)
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
    pub fn get_mutex(&self, name: &str) -> AsyncMutex {
        let retry_delay = self.config.retry_delay;
        let jitter_ms = num_milliseconds(self.config.retry_jitter);

        let mut mutex = AsyncMutex::new(name, self.instances.clone())
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
    pub async fn healthy_instance_count(&self) -> usize {
        let mut healthy = 0;
        for pool in &self.pools {
            if pool.health_check().await {
                healthy += 1;
            }
        }
        healthy
    }

    pub fn config(&self) -> &RedlockConfig {
        &self.config
    }
}
