//! Control module - interactive prompts and stdout output.
//!
//! Prompts and logs go to stderr. stdout carries only the optional JSON
//! summary, one object per line, so it can be piped into other tools.
//!
//! # Example
//!
//! ```ignore
//! use pcd_capture::control::{prompt_endpoint, write_stdout_json};
//!
//! let endpoint = prompt_endpoint(&mut std::io::stdin().lock(), &mut std::io::stderr())?;
//! write_stdout_json(&report.summary(&endpoint, None))?;
//! ```

mod prompt;
mod stdio;

pub use prompt::{prompt_endpoint, prompt_output_path};
pub use stdio::{write_stdout_json, write_stdout_line};
