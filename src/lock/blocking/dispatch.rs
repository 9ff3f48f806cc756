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
use std::sync::{mpsc, Arc};
use std::thread;

use crate::connection::Instance;
use crate::errors::{MultiError, RedlockResult};

/// Runs `act` against every instance on its own thread and waits for all of
/// them, even after quorum is already decided. Stragglers may have applied
/// their write despite a slow reply, and the caller's rollback has to see a
/// settled cluster before it can compensate.
///
/// Returns how many instances reported success together with the bag of real
/// failures; a clean "not acquired" / "not held" adds to neither.
pub(crate) fn dispatch<F>(instances: &[Arc<dyn Instance>], act: F) -> (usize, MultiError)
where
    F: Fn(&dyn Instance) -> RedlockResult<bool> + Sync,
{
    let (tx, rx) = mpsc::channel();
    thread::scope(|scope| {
        for instance in instances {
            let tx = tx.clone();
            let act = &act;
            scope.spawn(move || {
                let _ = tx.send(act(instance.as_ref()));
            });
        }
        // The receive loop ends once every worker has dropped its sender.
        drop(tx);

        let mut successes = 0;
        let mut errors = MultiError::new();
        for outcome in rx {
            match outcome {
                Ok(true) => successes += 1,
                Ok(false) => {}
                Err(err) => errors.push(err),
            }
        }
        (successes, errors)
    })
}
