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
use redlock::{AsyncRedlockClient, RedlockConfig, RedlockResult};

#[tokio::main]
async fn main() -> RedlockResult<()> {
    let config = RedlockConfig::new(vec![
        "redis://127.0.0.1:6379",
        "redis://127.0.0.1:6380",
        "redis://127.0.0.1:6381",
    ])
    .with_expiry(Duration::from_secs(2));

    let client = AsyncRedlockClient::new(config)?;
    println!(
        "{}/{} instances healthy",
        client.healthy_instance_count().await,
        client.config().servers.len()
    );

    let mut mutex = client.get_mutex("demo:async-settlement");
    mutex.lock().await?;
    println!("Lock held, valid until {:?}", mutex.until());

    // Critical section.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let (released, _) = mutex.unlock().await;
    println!("Released: {}", released);

    Ok(())
}
