pub mod driver;

pub use driver::{BrowserConfig, BrowserPageRenderer};
