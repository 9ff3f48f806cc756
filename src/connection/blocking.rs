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
use r2d2::{Pool, PooledConnection};
use redis::{Client, Script, Value};
use tracing::debug;

use crate::config::RedlockConfig;
use crate::connection::{build_connection_info, Instance};
use crate::errors::RedlockResult;
use crate::util::num_milliseconds;

/// Blocking [`Instance`] backed by an r2d2 pool of connections to a single
/// Redis server.
pub struct RedisInstance {
    pool: Pool<Client>,
    url: String,
}

impl RedisInstance {
    /// Builds the pool without touching the network; an unreachable server
    /// only fails once an operation asks it for a connection. A lock client
    /// must come up even while a minority of instances is down.
    pub fn connect(url: &str, config: &RedlockConfig) -> RedlockResult<Self> {
        let conn_info = build_connection_info(url, config)?;
        let client = Client::open(conn_info)?;
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(config.connection_timeout)
            .build_unchecked(client);

        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn connection(&self) -> RedlockResult<PooledConnection<Client>> {
        Ok(self.pool.get()?)
    }

    pub fn health_check(&self) -> bool {
        let healthy = self
            .connection()
            .and_then(|mut conn| {
                Ok(redis::cmd("PING").query::<String>(&mut *conn)? == "PONG")
            })
            .unwrap_or(false);
        if !healthy {
            debug!(url = %self.url, "instance failed health check");
        }
        healthy
    }
}

impl Instance for RedisInstance {
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> RedlockResult<bool> {
        let mut conn = self.connection()?;
        let reply: Value = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(num_milliseconds(ttl))
            .query(&mut *conn)?;
        Ok(matches!(reply, Value::Okay))
    }

    fn eval_int(&self, script: &Script, key: &str, args: &[&str]) -> RedlockResult<i64> {
        let mut conn = self.connection()?;
        let mut invocation = script.key(key);
        for arg in args {
            invocation.arg(*arg);
        }
        Ok(invocation.invoke(&mut *conn)?)
    }

    fn get(&self, key: &str) -> RedlockResult<Option<String>> {
        let mut conn = self.connection()?;
        Ok(redis::cmd("GET").arg(key).query(&mut *conn)?)
    }
}
