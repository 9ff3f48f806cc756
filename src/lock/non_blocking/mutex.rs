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
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::debug;

use crate::connection::AsyncInstance;
use crate::errors::{MultiError, RedlockError, RedlockResult};
use crate::lock::{
    default_delay_fn, default_value_fn, DelayFn, ValueFn, DEFAULT_DRIFT_FACTOR, DEFAULT_EXPIRY,
    DEFAULT_TRIES,
};
use crate::scripts;
use crate::util::{calculate_drift, calculate_quorum, num_milliseconds};

use super::dispatch;

/// Async flavor of [`Mutex`](crate::Mutex); same protocol, with tokio tasks
/// doing the fan-out and `tokio::time::sleep` between attempts.
pub struct AsyncMutex {
    name: String,
    expiry: Duration,
    tries: u32,
    delay_fn: DelayFn,
    drift_factor: f64,
    quorum: usize,
    value_fn: ValueFn,
    instances: Vec<Arc<dyn AsyncInstance>>,
    value: Option<String>,
    until: Option<Instant>,
}

impl AsyncMutex {
    pub fn new(name: impl Into<String>, instances: Vec<Arc<dyn AsyncInstance>>) -> Self {
        let quorum = calculate_quorum(instances.len());
        Self {
            name: name.into(),
            expiry: DEFAULT_EXPIRY,
            tries: DEFAULT_TRIES,
            delay_fn: default_delay_fn(),
            drift_factor: DEFAULT_DRIFT_FACTOR,
            quorum,
            value_fn: default_value_fn(),
            instances,
            value: None,
            until: None,
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_tries(mut self, tries: u32) -> Self {
        self.tries = tries.max(1);
        self
    }

    /// Fixed delay between acquisition attempts. Overridden by
    /// [`with_delay_fn`](Self::with_delay_fn).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.delay_fn = Arc::new(move |_attempt| delay);
        self
    }

    pub fn with_delay_fn(mut self, delay_fn: DelayFn) -> Self {
        self.delay_fn = delay_fn;
        self
    }

    pub fn with_drift_factor(mut self, drift_factor: f64) -> Self {
        self.drift_factor = drift_factor;
        self
    }

    pub fn with_value_fn(mut self, value_fn: ValueFn) -> Self {
        self.value_fn = value_fn;
        self
    }

    pub fn with_quorum(mut self, quorum: usize) -> Self {
        self.quorum = quorum.clamp(1, self.instances.len().max(1));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instant at which the current lease's validity runs out locally, if a
    /// lease is held.
    pub fn until(&self) -> Option<Instant> {
        self.until
    }

    /// Acquires the lock, retrying up to the configured number of attempts.
    /// See [`Mutex::lock`](crate::Mutex::lock) for the validity and rollback
    /// rules; the two flavors implement the same protocol.
    pub async fn lock(&mut self) -> RedlockResult<()> {
        let value = (self.value_fn)()?;

        for attempt in 0..self.tries {
            if attempt > 0 {
                sleep((self.delay_fn)(attempt)).await;
            }

            let start = Instant::now();
            let (acquired, errors) = {
                let name = self.name.clone();
                let value = value.clone();
                let expiry = self.expiry;
                dispatch(&self.instances, move |instance| {
                    Self::acquire_on(instance, name.clone(), value.clone(), expiry)
                })
                .await
            };
            if acquired == 0 && !errors.is_empty() {
                return Err(RedlockError::InstancesUnreachable(errors));
            }

            let finish = Instant::now();
            let drift = calculate_drift(self.expiry, self.drift_factor);
            let validity = self
                .expiry
                .checked_sub(finish - start)
                .and_then(|left| left.checked_sub(drift))
                .unwrap_or(Duration::ZERO);

            if acquired >= self.quorum && !validity.is_zero() {
                debug!(
                    name = %self.name,
                    acquired,
                    validity_ms = validity.as_millis() as u64,
                    "lock acquired"
                );
                self.value = Some(value);
                self.until = Some(finish + validity);
                return Ok(());
            }

            debug!(
                name = %self.name,
                acquired,
                quorum = self.quorum,
                "attempt failed, releasing all instances"
            );
            let name = self.name.clone();
            let rollback_value = value.clone();
            let _ = dispatch(&self.instances, move |instance| {
                Self::release_on(instance, name.clone(), rollback_value.clone())
            })
            .await;
        }

        Err(RedlockError::LockNotObtained)
    }

    /// Releases the lock on every instance that still holds this mutex's
    /// token. Returns whether a quorum of instances released, plus any
    /// per-instance failures. Local state is kept so a sub-quorum unlock can
    /// be retried.
    pub async fn unlock(&self) -> (bool, MultiError) {
        let name = self.name.clone();
        let value = self.value.clone().unwrap_or_default();
        let (released, errors) = dispatch(&self.instances, move |instance| {
            Self::release_on(instance, name.clone(), value.clone())
        })
        .await;
        if released < self.quorum {
            debug!(name = %self.name, released, quorum = self.quorum, "unlock below quorum");
        }
        (released >= self.quorum, errors)
    }

    /// Resets the lease to the full expiry on every instance still holding
    /// this mutex's token. Does not recompute validity; callers needing a
    /// drift-aware window should re-acquire instead.
    pub async fn extend(&self) -> (bool, MultiError) {
        let name = self.name.clone();
        let value = self.value.clone().unwrap_or_default();
        let expiry = self.expiry;
        let (extended, errors) = dispatch(&self.instances, move |instance| {
            Self::touch_on(instance, name.clone(), value.clone(), expiry)
        })
        .await;
        if extended < self.quorum {
            debug!(name = %self.name, extended, quorum = self.quorum, "extend below quorum");
        }
        (extended >= self.quorum, errors)
    }

    /// Reads every instance and reports whether a quorum still carries this
    /// mutex's token. Diagnostic only; mutates nothing.
    pub async fn valid(&self) -> (bool, MultiError) {
        let name = self.name.clone();
        let value = self.value.clone().unwrap_or_default();
        let (held, errors) = dispatch(&self.instances, move |instance| {
            Self::check_on(instance, name.clone(), value.clone())
        })
        .await;
        (held >= self.quorum, errors)
    }

    async fn acquire_on(
        instance: Arc<dyn AsyncInstance>,
        name: String,
        value: String,
        expiry: Duration,
    ) -> RedlockResult<bool> {
        instance.set_if_absent(&name, &value, expiry).await
    }

    async fn release_on(
        instance: Arc<dyn AsyncInstance>,
        name: String,
        value: String,
    ) -> RedlockResult<bool> {
        Ok(instance
            .eval_int(&scripts::RELEASE_SCRIPT, &name, &[&value])
            .await?
            != 0)
    }

    async fn touch_on(
        instance: Arc<dyn AsyncInstance>,
        name: String,
        value: String,
        expiry: Duration,
    ) -> RedlockResult<bool> {
        let ttl_ms = num_milliseconds(expiry).to_string();
        Ok(instance
            .eval_int(&scripts::EXTEND_SCRIPT, &name, &[&value, &ttl_ms])
            .await?
            != 0)
    }

    async fn check_on(
        instance: Arc<dyn AsyncInstance>,
        name: String,
        value: String,
    ) -> RedlockResult<bool> {
        Ok(instance.get(&name).await?.as_deref() == Some(value.as_str()))
    }
}
