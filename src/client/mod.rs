//! Redis/Sentinel client module.
//!
//! Provides a thin administrative wrapper around the `fred` Redis client plus
//! parsing for the text replies the operator inspects.
//!
//! - `redis_client`: connection handling and the commands the operator issues
//!   (`INFO`, `SLAVEOF`, `CONFIG SET`, `SENTINEL ...`)
//! - `parsing`: pure parsing of `INFO` and `SENTINEL MASTER` output

pub mod parsing;
pub mod redis_client;

pub use parsing::{ParseError, ReplicationInfo, Role, SentinelMasterInfo};
pub use redis_client::{RedisAdmin, RedisError};
