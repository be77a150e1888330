pub mod config;

pub use config::{ConfigOverrides, Credentials, TestConfig};
