pub mod config;
pub mod database;
pub mod submit;
pub mod web;

#[cfg(test)]
mod testing;
