pub mod formatter;
pub mod spinner;
