//! event-receiver
//!
//! Accepts events from HTTP, a polled queue (AWS SQS or Redis Streams) or an
//! AWS Lambda SQS trigger and hands each one, as bytes, to a single
//! [`processor::Processor`].
pub mod app;
pub mod config;
pub mod errors;
pub mod http;
pub mod ingest;
pub mod lambda;
pub mod pool;
pub mod processor;
pub mod redis;
pub mod sqs;
