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
mod blocking;
#[cfg(feature = "async")]
mod non_blocking;

pub use blocking::*;
#[cfg(feature = "async")]
pub use non_blocking::*;

use std::sync::Arc;
use std::time::Duration;

use crate::errors::RedlockResult;
use crate::util::{generate_token, jitter_delay};

/// Maps an attempt index (1-based, only called between attempts) to the time
/// to wait before that attempt.
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Produces the unguessable per-acquire token.
pub type ValueFn = Arc<dyn Fn() -> RedlockResult<String> + Send + Sync>;

pub(crate) const DEFAULT_EXPIRY: Duration = Duration::from_secs(8);
pub(crate) const DEFAULT_TRIES: u32 = 32;
pub(crate) const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
pub(crate) const DEFAULT_RETRY_JITTER_MS: u64 = 50;
pub(crate) const DEFAULT_DRIFT_FACTOR: f64 = 0.01;

pub(crate) fn default_delay_fn() -> DelayFn {
    Arc::new(|_attempt| jitter_delay(DEFAULT_RETRY_DELAY, DEFAULT_RETRY_JITTER_MS))
}

pub(crate) fn default_value_fn() -> ValueFn {
    Arc::new(generate_token)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, Instant};

    use redis::Script;

    use crate::connection::Instance;
    use crate::errors::{RedlockError, RedlockResult};
    use crate::scripts;

    /// In-memory stand-in for one Redis instance: a key space with
    /// millisecond expiry, optional injected transport failure, and optional
    /// injected latency. Counts protocol calls so tests can assert attempt
    /// bounds.
    pub(crate) struct FakeInstance {
        store: StdMutex<HashMap<String, (String, Instant)>>,
        failing: AtomicBool,
        latency: StdMutex<Duration>,
        pub(crate) acquire_calls: AtomicUsize,
        pub(crate) release_calls: AtomicUsize,
    }

    impl FakeInstance {
        pub(crate) fn healthy() -> Self {
            Self {
                store: StdMutex::new(HashMap::new()),
                failing: AtomicBool::new(false),
                latency: StdMutex::new(Duration::ZERO),
                acquire_calls: AtomicUsize::new(0),
                release_calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            let instance = Self::healthy();
            instance.failing.store(true, Ordering::SeqCst);
            instance
        }

        pub(crate) fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub(crate) fn set_latency(&self, latency: Duration) {
            *self.latency.lock().unwrap() = latency;
        }

        pub(crate) fn latency(&self) -> Duration {
            *self.latency.lock().unwrap()
        }

        /// Plants a competitor's lease so the next acquire loses the race.
        pub(crate) fn preset(&self, key: &str, value: &str, ttl: Duration) {
            self.store.lock().unwrap().insert(
                key.to_string(),
                (value.to_string(), Instant::now() + ttl),
            );
        }

        pub(crate) fn holds(&self, key: &str, value: &str) -> bool {
            let store = self.store.lock().unwrap();
            match store.get(key) {
                Some((held, deadline)) => held == value && *deadline > Instant::now(),
                None => false,
            }
        }

        pub(crate) fn is_vacant(&self, key: &str) -> bool {
            let store = self.store.lock().unwrap();
            match store.get(key) {
                Some((_, deadline)) => *deadline <= Instant::now(),
                None => true,
            }
        }

        fn fail_if_injected(&self) -> RedlockResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(RedlockError::PoolError("injected transport failure".to_string()))
            } else {
                Ok(())
            }
        }

        fn purge_expired(store: &mut HashMap<String, (String, Instant)>, key: &str) {
            if let Some((_, deadline)) = store.get(key) {
                if *deadline <= Instant::now() {
                    store.remove(key);
                }
            }
        }

        pub(crate) fn do_set_if_absent(
            &self,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> RedlockResult<bool> {
            self.acquire_calls.fetch_add(1, Ordering::SeqCst);
            self.fail_if_injected()?;
            let mut store = self.store.lock().unwrap();
            Self::purge_expired(&mut store, key);
            if store.contains_key(key) {
                return Ok(false);
            }
            store.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
            Ok(true)
        }

        pub(crate) fn do_eval_int(
            &self,
            script: &Script,
            key: &str,
            args: &[&str],
        ) -> RedlockResult<i64> {
            if script.get_hash() == scripts::RELEASE_SCRIPT.get_hash() {
                self.release_calls.fetch_add(1, Ordering::SeqCst);
                self.fail_if_injected()?;
                let mut store = self.store.lock().unwrap();
                Self::purge_expired(&mut store, key);
                match store.get(key) {
                    Some((held, _)) if held == args[0] => {
                        store.remove(key);
                        Ok(1)
                    }
                    _ => Ok(0),
                }
            } else if script.get_hash() == scripts::EXTEND_SCRIPT.get_hash() {
                self.fail_if_injected()?;
                let ttl = Duration::from_millis(args[1].parse().unwrap());
                let mut store = self.store.lock().unwrap();
                Self::purge_expired(&mut store, key);
                match store.get_mut(key) {
                    Some((held, deadline)) if held == args[0] => {
                        *deadline = Instant::now() + ttl;
                        Ok(1)
                    }
                    _ => Ok(0),
                }
            } else {
                panic!("unexpected script");
            }
        }

        pub(crate) fn do_get(&self, key: &str) -> RedlockResult<Option<String>> {
            self.fail_if_injected()?;
            let mut store = self.store.lock().unwrap();
            Self::purge_expired(&mut store, key);
            Ok(store.get(key).map(|(value, _)| value.clone()))
        }
    }

    impl Instance for FakeInstance {
        fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> RedlockResult<bool> {
            let latency = self.latency();
            if !latency.is_zero() {
                std::thread::sleep(latency);
            }
            self.do_set_if_absent(key, value, ttl)
        }

        fn eval_int(&self, script: &Script, key: &str, args: &[&str]) -> RedlockResult<i64> {
            self.do_eval_int(script, key, args)
        }

        fn get(&self, key: &str) -> RedlockResult<Option<String>> {
            self.do_get(key)
        }
    }

    #[cfg(feature = "async")]
    #[async_trait::async_trait]
    impl crate::connection::AsyncInstance for FakeInstance {
        async fn set_if_absent(
            &self,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> RedlockResult<bool> {
            let latency = self.latency();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            self.do_set_if_absent(key, value, ttl)
        }

        async fn eval_int(&self, script: &Script, key: &str, args: &[&str]) -> RedlockResult<i64> {
            self.do_eval_int(script, key, args)
        }

        async fn get(&self, key: &str) -> RedlockResult<Option<String>> {
            self.do_get(key)
        }
    }
}
