// src/transport/mod.rs
mod plain_http;

pub use plain_http::{downgrade_scheme, PlainHttp, PlainHttpLayer};
