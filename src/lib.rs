pub mod app;
pub mod cli;
pub mod config;
pub mod controller;
pub mod output;
pub mod pagination;
pub mod render;
pub mod source;
pub mod tracker;

#[cfg(test)]
mod tests;
