//! Classroom stream: posts, classwork submissions, grading, comments and chat
//! over SQLite and pluggable object storage.

pub mod api;
pub mod classroom;
pub mod config;
pub mod db;
pub mod error;
pub mod storage;

#[cfg(test)]
mod test_support;
