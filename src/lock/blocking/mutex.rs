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
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::connection::Instance;
use crate::errors::{MultiError, RedlockError, RedlockResult};
use crate::lock::{
    default_delay_fn, default_value_fn, DelayFn, ValueFn, DEFAULT_DRIFT_FACTOR, DEFAULT_EXPIRY,
    DEFAULT_TRIES,
};
use crate::scripts;
use crate::util::{calculate_drift, calculate_quorum, num_milliseconds};

use super::dispatch;

/// A distributed mutual-exclusion lock over a set of independent Redis
/// instances.
///
/// The lock is held once a strict majority of instances has recorded this
/// mutex's per-acquire token under the lock key, and only for the validity
/// window computed at acquisition time. One `Mutex` must not be shared
/// between threads without external synchronization; distributed exclusion
/// is between processes, not within one.
pub struct Mutex {
    name: String,
    expiry: Duration,
    tries: u32,
    delay_fn: DelayFn,
    drift_factor: f64,
    quorum: usize,
    value_fn: ValueFn,
    instances: Vec<Arc<dyn Instance>>,
    value: Option<String>,
    until: Option<Instant>,
}

impl Mutex {
    pub fn new(name: impl Into<String>, instances: Vec<Arc<dyn Instance>>) -> Self {
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
    ///
    /// Each attempt fans a set-if-absent out to every instance, then
    /// measures the validity left on the lease: the full expiry minus the
    /// time the fan-out took minus the drift budget. Quorum with positive
    /// validity wins; anything less is rolled back on every instance before
    /// the next attempt, because an instance whose reply was lost may still
    /// have accepted the write.
    pub fn lock(&mut self) -> RedlockResult<()> {
        let value = (self.value_fn)()?;

        for attempt in 0..self.tries {
            if attempt > 0 {
                thread::sleep((self.delay_fn)(attempt));
            }

            let start = Instant::now();
            let (acquired, errors) = dispatch(&self.instances, |instance| {
                instance.set_if_absent(&self.name, &value, self.expiry)
            });
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
            let _ = dispatch(&self.instances, |instance| {
                Self::release_on(instance, &self.name, &value)
            });
        }

        Err(RedlockError::LockNotObtained)
    }

    /// Releases the lock on every instance that still holds this mutex's
    /// token. Returns whether a quorum of instances released, plus any
    /// per-instance failures. Local state is kept so a sub-quorum unlock can
    /// be retried.
    pub fn unlock(&self) -> (bool, MultiError) {
        let value = self.value.clone().unwrap_or_default();
        let (released, errors) = dispatch(&self.instances, |instance| {
            Self::release_on(instance, &self.name, &value)
        });
        if released < self.quorum {
            debug!(name = %self.name, released, quorum = self.quorum, "unlock below quorum");
        }
        (released >= self.quorum, errors)
    }

    /// Resets the lease to the full expiry on every instance still holding
    /// this mutex's token. Does not recompute validity; callers needing a
    /// drift-aware window should re-acquire instead.
    pub fn extend(&self) -> (bool, MultiError) {
        let value = self.value.clone().unwrap_or_default();
        let (extended, errors) = dispatch(&self.instances, |instance| {
            Self::touch_on(instance, &self.name, &value, self.expiry)
        });
        if extended < self.quorum {
            debug!(name = %self.name, extended, quorum = self.quorum, "extend below quorum");
        }
        (extended >= self.quorum, errors)
    }

    /// Reads every instance and reports whether a quorum still carries this
    /// mutex's token. Diagnostic only; mutates nothing.
    pub fn valid(&self) -> (bool, MultiError) {
        let value = self.value.clone().unwrap_or_default();
        let (held, errors) = dispatch(&self.instances, |instance| {
            Self::check_on(instance, &self.name, &value)
        });
        (held >= self.quorum, errors)
    }

    fn release_on(instance: &dyn Instance, name: &str, value: &str) -> RedlockResult<bool> {
        Ok(instance.eval_int(&scripts::RELEASE_SCRIPT, name, &[value])? != 0)
    }

    fn touch_on(
        instance: &dyn Instance,
        name: &str,
        value: &str,
        expiry: Duration,
    ) -> RedlockResult<bool> {
        let ttl_ms = num_milliseconds(expiry).to_string();
        Ok(instance.eval_int(&scripts::EXTEND_SCRIPT, name, &[value, &ttl_ms])? != 0)
    }

    fn check_on(instance: &dyn Instance, name: &str, value: &str) -> RedlockResult<bool> {
        Ok(instance.get(name)?.as_deref() == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use crate::lock::testing::FakeInstance;

    const EXPIRY: Duration = Duration::from_millis(1000);

    fn cluster(n: usize) -> Vec<Arc<FakeInstance>> {
        (0..n).map(|_| Arc::new(FakeInstance::healthy())).collect()
    }

    fn mutex_over(name: &str, fakes: &[Arc<FakeInstance>]) -> Mutex {
        let instances: Vec<Arc<dyn Instance>> = fakes
            .iter()
            .map(|fake| Arc::clone(fake) as Arc<dyn Instance>)
            .collect();
        Mutex::new(name, instances)
            .with_expiry(EXPIRY)
            .with_tries(2)
            .with_retry_delay(Duration::from_millis(5))
    }

    #[test]
    fn round_trip_lock_valid_unlock() {
        let fakes = cluster(3);
        let mut mutex = mutex_over("round-trip", &fakes);

        mutex.lock().unwrap();
        let (held, errors) = mutex.valid();
        assert!(held);
        assert!(errors.is_empty());

        let (released, errors) = mutex.unlock();
        assert!(released);
        assert!(errors.is_empty());

        let (held, _) = mutex.valid();
        assert!(!held);
        for fake in &fakes {
            assert!(fake.is_vacant("round-trip"));
        }
    }

    #[test]
    fn validity_is_bounded_by_expiry_minus_drift() {
        let fakes = cluster(3);
        let mut mutex = mutex_over("validity", &fakes);

        mutex.lock().unwrap();
        let until = mutex.until().expect("held lock has a deadline");
        let now = Instant::now();
        let drift = calculate_drift(EXPIRY, DEFAULT_DRIFT_FACTOR);

        assert!(until > now);
        assert!(until - now <= EXPIRY - drift);
    }

    #[test]
    fn survives_one_failing_instance() {
        let fakes = cluster(3);
        fakes[2].set_failing(true);
        let mut mutex = mutex_over("one-down", &fakes);

        mutex.lock().unwrap();

        let (held, errors) = mutex.valid();
        assert!(held);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn fails_and_rolls_back_below_quorum() {
        let fakes = cluster(3);
        fakes[1].set_failing(true);
        fakes[2].set_failing(true);
        let mut mutex = mutex_over("two-down", &fakes);

        match mutex.lock() {
            Err(RedlockError::LockNotObtained) => {}
            other => panic!("expected LockNotObtained, got {other:?}"),
        }

        // The single successful write was compensated on every attempt.
        assert!(fakes[0].is_vacant("two-down"));
        assert!(mutex.until().is_none());
    }

    #[test]
    fn returns_aggregated_error_when_no_instance_succeeds() {
        let fakes: Vec<Arc<FakeInstance>> =
            (0..3).map(|_| Arc::new(FakeInstance::failing())).collect();
        let mut mutex = mutex_over("all-down", &fakes);

        match mutex.lock() {
            Err(RedlockError::InstancesUnreachable(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected InstancesUnreachable, got {other:?}"),
        }

        // The early exit happens on the first attempt, before any retry.
        for fake in &fakes {
            assert_eq!(fake.acquire_calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn lost_race_retries_without_escalating() {
        let fakes = cluster(3);
        // A competitor already owns two of three instances.
        fakes[0].preset("contended", "competitor", Duration::from_secs(5));
        fakes[1].preset("contended", "competitor", Duration::from_secs(5));
        let mut mutex = mutex_over("contended", &fakes);

        match mutex.lock() {
            Err(RedlockError::LockNotObtained) => {}
            other => panic!("expected LockNotObtained, got {other:?}"),
        }

        // The instance this mutex briefly acquired was rolled back, and the
        // competitor's leases were never touched.
        assert!(fakes[2].is_vacant("contended"));
        assert!(fakes[0].holds("contended", "competitor"));
        assert!(fakes[1].holds("contended", "competitor"));
    }

    #[test]
    fn attempt_and_rollback_dispatches_are_bounded() {
        let fakes = cluster(3);
        for fake in &fakes {
            fake.preset("bounded", "competitor", Duration::from_secs(5));
        }
        let mut mutex = mutex_over("bounded", &fakes).with_tries(3);

        assert!(mutex.lock().is_err());

        for fake in &fakes {
            assert_eq!(fake.acquire_calls.load(Ordering::SeqCst), 3);
            assert_eq!(fake.release_calls.load(Ordering::SeqCst), 3);
        }
    }

    #[test]
    fn delay_policy_runs_only_between_attempts() {
        let fakes = cluster(3);
        for fake in &fakes {
            fake.preset("delays", "competitor", Duration::from_secs(5));
        }

        let observed = Arc::new(StdMutex::new(Vec::new()));
        let recorded = Arc::clone(&observed);
        let mut mutex = mutex_over("delays", &fakes)
            .with_tries(3)
            .with_delay_fn(Arc::new(move |attempt| {
                recorded.lock().unwrap().push(attempt);
                Duration::ZERO
            }));

        assert!(mutex.lock().is_err());
        // Never before the first attempt, never after the last.
        assert_eq!(*observed.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn too_slow_acquisition_voids_the_lease() {
        let fakes = cluster(3);
        for fake in &fakes {
            fake.set_latency(Duration::from_millis(60));
        }
        let mut mutex = mutex_over("too-slow", &fakes)
            .with_expiry(Duration::from_millis(50))
            .with_tries(2)
            .with_retry_delay(Duration::ZERO);

        // Every instance accepts the write, but the fan-out outlives the
        // lease; the acquire must not be reported as held.
        match mutex.lock() {
            Err(RedlockError::LockNotObtained) => {}
            other => panic!("expected LockNotObtained, got {other:?}"),
        }
        assert!(mutex.until().is_none());
    }

    #[test]
    fn unlock_is_idempotent_per_token() {
        let fakes = cluster(3);
        let mut mutex = mutex_over("idempotent", &fakes);

        mutex.lock().unwrap();
        let (first, _) = mutex.unlock();
        let (second, _) = mutex.unlock();
        assert!(first);
        assert!(!second);
    }

    #[test]
    fn stale_unlock_cannot_steal_a_newer_lease() {
        let fakes = cluster(3);
        let mut first = mutex_over("stale", &fakes).with_expiry(Duration::from_millis(100));
        first.lock().unwrap();

        // Let the first lease lapse everywhere, then hand the key to a
        // second client.
        thread::sleep(Duration::from_millis(150));
        let mut second = mutex_over("stale", &fakes);
        second.lock().unwrap();

        let (released, _) = first.unlock();
        assert!(!released);
        let (held, _) = second.valid();
        assert!(held);
    }

    #[test]
    fn extend_renews_a_held_lease() {
        let fakes = cluster(3);
        let mut mutex = mutex_over("extend", &fakes).with_expiry(Duration::from_millis(200));
        mutex.lock().unwrap();

        thread::sleep(Duration::from_millis(120));
        let (extended, errors) = mutex.extend();
        assert!(extended);
        assert!(errors.is_empty());

        // The renewed lease outlives the original deadline.
        thread::sleep(Duration::from_millis(120));
        let (held, _) = mutex.valid();
        assert!(held);
    }

    #[test]
    fn extend_on_idle_mutex_matches_nothing() {
        let fakes = cluster(3);
        let mutex = mutex_over("idle-extend", &fakes);

        let (extended, errors) = mutex.extend();
        assert!(!extended);
        assert!(errors.is_empty());
    }

    #[test]
    fn value_source_failure_touches_no_instance() {
        let fakes = cluster(3);
        let mut mutex = mutex_over("rng-down", &fakes).with_value_fn(Arc::new(|| {
            Err(RedlockError::ValueSource("entropy exhausted".to_string()))
        }));

        match mutex.lock() {
            Err(RedlockError::ValueSource(_)) => {}
            other => panic!("expected ValueSource, got {other:?}"),
        }
        for fake in &fakes {
            assert_eq!(fake.acquire_calls.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn racing_clients_cannot_both_win() {
        // Two clients race over the same three instances; at most one can
        // reach quorum because each instance stores a single token.
        let fakes = cluster(3);
        let wins = Arc::new(AtomicUsize::new(0));

        thread::scope(|scope| {
            for _ in 0..2 {
                let fakes = &fakes;
                let wins = Arc::clone(&wins);
                scope.spawn(move || {
                    let mut mutex = mutex_over("race", fakes).with_tries(1);
                    if mutex.lock().is_ok() {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert!(wins.load(Ordering::SeqCst) <= 1);
    }
}
