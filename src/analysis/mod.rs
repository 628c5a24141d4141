pub mod semantic;
pub mod symbols;
pub mod types;
