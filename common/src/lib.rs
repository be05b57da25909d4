//! Image to Excel Common Library
//!
//! CLIとUI層で共有される型と、I/Oを伴わないレイアウト計算

pub mod types;
pub mod layout;
pub mod error;

pub use types::{Config, ProcessResult};
pub use layout::{CellBox, Fit, fit_image, column_index, column_name};
pub use error::{Error, Result};
