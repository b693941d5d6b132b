//! Custom Resource Definitions for the operator.
//!
//! - `RedisFailover`: declarative description of a managed Redis replication
//!   set with a Sentinel quorum.

mod redis_failover;

pub use redis_failover::*;
