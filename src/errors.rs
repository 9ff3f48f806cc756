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

use std::fmt;
use redis::RedisError;
use thiserror::Error;

pub type RedlockResult<T> = std::result::Result<T, RedlockError>;

#[derive(Error, Debug)]
pub enum RedlockError {
    #[error("Redis error: {0}")]
    RedisError(#[from] RedisError),

    #[error("Value source error: {0}")]
    ValueSource(String),

    #[error("Failed to acquire lock: quorum not reached")]
    LockNotObtained,

    #[error("No instance acquired the lock: {0}")]
    InstancesUnreachable(MultiError),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Connection pool error: {0}")]
    PoolError(String),

    #[error("Async runtime error: {0}")]
    AsyncError(String),
}

impl From<r2d2::Error> for RedlockError {
    fn from(err: r2d2::Error) -> Self {
        RedlockError::PoolError(err.to_string())
    }
}

impl From<rand::Error> for RedlockError {
    fn from(err: rand::Error) -> Self {
        RedlockError::ValueSource(err.to_string())
    }
}

#[cfg(feature = "async")]
impl From<deadpool::managed::PoolError<RedisError>> for RedlockError {
    fn from(err: deadpool::managed::PoolError<RedisError>) -> Self {
        RedlockError::PoolError(err.to_string())
    }
}

#[cfg(feature = "async")]
impl From<deadpool::managed::BuildError> for RedlockError {
    fn from(err: deadpool::managed::BuildError) -> Self {
        RedlockError::PoolError(err.to_string())
    }
}

#[cfg(feature = "async")]
impl From<tokio::task::JoinError> for RedlockError {
    fn from(err: tokio::task::JoinError) -> Self {
        RedlockError::AsyncError(err.to_string())
    }
}

/// Bag of per-instance errors collected by one fan-out operation.
///
/// Instances that cleanly report "not acquired" / "not held" contribute
/// nothing; only real transport or scripting failures end up here. The bag
/// may be non-empty even when the operation reached quorum.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<RedlockError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: RedlockError) {
        self.errors.push(err);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RedlockError> {
        self.errors.iter()
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} instance error(s)", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            if i == 0 {
                write!(f, ": ")?;
            } else {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}
