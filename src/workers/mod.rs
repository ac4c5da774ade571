//! The two worker threads a session runs for its whole lifetime: inbox
//! (gateway -> backend) and outbox (backend -> gateway). Both follow the
//! same shape: lock the registry just long enough to snapshot or drain a
//! queue, release it, then perform blocking-free I/O against a duplicated
//! fd the worker owns outright.

pub mod inbox;
pub mod outbox;
