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
use std::time::Duration;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

use crate::errors::RedlockResult;

const TOKEN_BYTES: usize = 16;

/// Generates the per-acquire lock token: 16 random octets from the operating
/// system RNG, base64-encoded. An RNG failure is surfaced to the caller
/// instead of silently producing a guessable value.
pub fn generate_token() -> RedlockResult<String> {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut buf)?;
    Ok(BASE64.encode(buf))
}

pub fn num_milliseconds(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Clock-drift budget reserved out of the lease, rounded up to a whole
/// millisecond.
pub fn calculate_drift(ttl: Duration, drift_factor: f64) -> Duration {
    let drift_ms = (ttl.as_millis() as f64 * drift_factor).ceil() as u64;
    Duration::from_millis(drift_ms)
}

pub fn calculate_quorum(n: usize) -> usize {
    n / 2 + 1
}

/// Spreads a fixed retry delay by up to `jitter_ms` in either direction so
/// contending clients do not retry in lockstep.
pub fn jitter_delay(base_delay: Duration, jitter_ms: u64) -> Duration {
    if jitter_ms == 0 {
        return base_delay;
    }
    let mut rng = rand::thread_rng();
    let jitter = Duration::from_millis(rng.gen_range(0..=jitter_ms));
    if rng.gen_bool(0.5) {
        base_delay + jitter
    } else {
        base_delay - jitter.min(base_delay)
    }
}
