pub mod driver;
pub mod error;
pub mod parser;
pub mod report;
pub mod runner;
pub mod utils;

// Re-export common items
pub use error::HarnessError;
pub use report::{generate_report, Grade, RunReport};
pub use runner::{run_suite, run_suite_with, Collaborators};
pub use utils::TestConfig;
