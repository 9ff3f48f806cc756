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

//! Quorum-based distributed mutual exclusion over independent Redis
//! instances: a lock is held while a strict majority of instances carries
//! the client's unguessable token under the lock key, for a drift-adjusted
//! validity window.
//!
//! ```rust,no_run
//! use redlock::{RedlockClient, RedlockConfig};
//!
//! # fn main() -> redlock::RedlockResult<()> {
//! let client = RedlockClient::new(RedlockConfig::new(vec![
//!     "redis://127.0.0.1:6379",
//!     "redis://127.0.0.1:6380",
//!     "redis://127.0.0.1:6381",
//! ]))?;
//!
//! let mut mutex = client.get_mutex("orders:settlement");
//! mutex.lock()?;
//! // critical section, safe until mutex.until()
//! let (released, _) = mutex.unlock();
//! assert!(released);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod connection;
mod errors;
mod lock;
mod scripts;
mod util;

pub use client::*;
pub use config::*;
pub use connection::*;
pub use errors::*;
pub use lock::*;
pub use scripts::*;
pub use util::*;
