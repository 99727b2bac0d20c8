pub mod placeholder;
pub mod text;
