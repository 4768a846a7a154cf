//! Output handling: validated, atomic writes into the output directory.

pub mod writer;

pub use writer::{remove_matching, validate_output_path, write_file};
