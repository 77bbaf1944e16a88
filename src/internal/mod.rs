pub mod collector;
pub mod config;
pub mod error_window;
pub mod events;
pub mod job;
pub mod pipeline;
pub mod pool;
pub mod producer;
pub mod scaling;
pub mod shutdown;
pub mod supervisor;
pub mod worker;
pub mod workload;
