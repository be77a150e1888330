pub mod types;
pub mod yaml;

pub use types::SuiteDefinition;
pub use yaml::{default_suite, load_suite, parse_suite, parse_suite_file, DEFAULT_SUITE_YAML};
