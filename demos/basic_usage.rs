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
use redlock::{RedlockClient, RedlockConfig, RedlockResult};

fn main() -> RedlockResult<()> {
    // One URL per independent Redis instance (no replication between them).
    let config = RedlockConfig::new(vec![
        "redis://127.0.0.1:6379",
        "redis://127.0.0.1:6380",
        "redis://127.0.0.1:6381",
    ])
    .with_expiry(Duration::from_secs(2))
    .with_tries(8)
    .with_retry_delay(Duration::from_millis(200));

    let client = RedlockClient::new(config)?;
    println!(
        "{}/{} instances healthy",
        client.healthy_instance_count(),
        client.config().servers.len()
    );

    let mut mutex = client.get_mutex("demo:settlement");
    mutex.lock()?;
    println!("Lock held, valid until {:?}", mutex.until());

    // Critical section.
    std::thread::sleep(Duration::from_millis(500));

    let (extended, _) = mutex.extend();
    println!("Extended: {}", extended);

    let (released, _) = mutex.unlock();
    println!("Released: {}", released);

    Ok(())
}
