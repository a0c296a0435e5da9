pub mod decoder;
pub mod mel;
pub mod trim;
