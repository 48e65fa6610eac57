pub mod api;
pub mod config;
pub mod history;
pub mod markup;
pub mod timestamp;
pub mod tool;

#[cfg(test)]
mod testing;
