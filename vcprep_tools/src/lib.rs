//! Utilities over a finished dataset build directory.

pub mod manifest_to_jsonl;
