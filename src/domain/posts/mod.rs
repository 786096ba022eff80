//! Posts: schedules, drafts, threads and media

#[cfg(test)]
pub mod memory;
pub mod models;
pub mod queries;
pub mod store;
pub mod thread;
