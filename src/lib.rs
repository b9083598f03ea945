pub mod anonymize;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod parsers;
pub mod pipeline;
pub mod prompts;
pub mod response;
pub mod retry;
pub mod server;
pub mod session;
pub mod structured;
pub mod tools;
pub mod verdict;
