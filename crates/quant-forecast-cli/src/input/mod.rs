pub mod csv_series;
pub mod file;
pub mod stdin;
