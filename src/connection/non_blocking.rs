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
use deadpool::managed::{Metrics, Pool, RecycleError, RecycleResult, Timeouts};
use deadpool::Runtime;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError, Script, Value};
use tracing::debug;

use crate::config::RedlockConfig;
use crate::connection::{build_connection_info, AsyncInstance};
use crate::errors::RedlockResult;
use crate::util::num_milliseconds;

pub struct AsyncConnectionManager {
    client: Client,
    database: Option<i64>,
}

#[async_trait::async_trait]
impl deadpool::managed::Manager for AsyncConnectionManager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        if let Some(db) = self.database {
            redis::cmd("SELECT").arg(db).query_async::<()>(&mut conn).await?;
        }
        Ok(conn)
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _metrics: &Metrics,
    ) -> RecycleResult<Self::Error> {
        match redis::cmd("PING").query_async::<String>(conn).await {
            Ok(pong) if pong == "PONG" => Ok(()),
            Ok(_) => Err(RecycleError::Message("Invalid PONG response".into())),
            Err(e) => Err(RecycleError::Backend(e)),
        }
    }
}

/// Async [`AsyncInstance`] backed by a deadpool-managed pool of multiplexed
/// connections to a single Redis server. Connections are created lazily, so
/// an unreachable server fails per-operation rather than at construction.
pub struct AsyncRedisInstance {
    pool: Pool<AsyncConnectionManager>,
    url: String,
}

impl AsyncRedisInstance {
    pub fn connect(url: &str, config: &RedlockConfig) -> RedlockResult<Self> {
        let conn_info = build_connection_info(url, config)?;
        let client = Client::open(conn_info)?;
        let manager = AsyncConnectionManager {
            client,
            database: config.database,
        };
        let pool = Pool::builder(manager)
            .max_size(config.pool_size as usize)
            .timeouts(Timeouts {
                wait: Some(config.connection_timeout),
                create: Some(config.connection_timeout),
                recycle: Some(Duration::from_secs(5)),
            })
            .runtime(Runtime::Tokio1)
            .build()?;

        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn connection(&self) -> RedlockResult<deadpool::managed::Object<AsyncConnectionManager>> {
        Ok(self.pool.get().await?)
    }

    pub async fn health_check(&self) -> bool {
        let healthy = match self.connection().await {
            Ok(mut conn) => matches!(
                redis::cmd("PING").query_async::<String>(&mut *conn).await,
                Ok(pong) if pong == "PONG"
            ),
            Err(_) => false,
        };
        if !healthy {
            debug!(url = %self.url, "instance failed health check");
        }
        healthy
    }
}

#[async_trait::async_trait]
impl AsyncInstance for AsyncRedisInstance {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> RedlockResult<bool> {
        let mut conn = self.connection().await?;
        let reply: Value = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(num_milliseconds(ttl))
            .query_async(&mut *conn)
            .await?;
        Ok(matches!(reply, Value::Okay))
    }

    async fn eval_int(&self, script: &Script, key: &str, args: &[&str]) -> RedlockResult<i64> {
        let mut conn = self.connection().await?;
        let mut invocation = script.key(key);
        for arg in args {
            invocation.arg(*arg);
        }
        Ok(invocation.invoke_async(&mut *conn).await?)
    }

    async fn get(&self, key: &str) -> RedlockResult<Option<String>> {
        let mut conn = self.connection().await?;
        Ok(redis::cmd("GET").arg(key).query_async(&mut *conn).await?)
    }
}
