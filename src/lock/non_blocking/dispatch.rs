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
use std::future::Future;
use std::sync::Arc;

use crate::connection::AsyncInstance;
use crate::errors::{MultiError, RedlockResult};

/// Spawns `act` against every instance before awaiting any reply, then joins
/// all tasks, even after quorum is already decided. Stragglers may have
/// applied their write despite a slow reply, and the caller's rollback has
/// to see a settled cluster before it can compensate.
///
/// Tasks are never cancelled; a panicked or aborted task folds into the
/// error bag like a transport failure.
pub(crate) async fn dispatch<F, Fut>(
    instances: &[Arc<dyn AsyncInstance>],
    act: F,
) -> (usize, MultiError)
where
    F: Fn(Arc<dyn AsyncInstance>) -> Fut,
    Fut: Future<Output = RedlockResult<bool>> + Send + 'static,
{
    let mut tasks = Vec::with_capacity(instances.len());
    for instance in instances {
        tasks.push(tokio::spawn(act(Arc::clone(instance))));
    }

    let mut successes = 0;
    let mut errors = MultiError::new();
    for task in tasks {
        match task.await {
            Ok(Ok(true)) => successes += 1,
            Ok(Ok(false)) => {}
            Ok(Err(err)) => errors.push(err),
            Err(err) => errors.push(err.into()),
        }
    }
    (successes, errors)
}
