//! Walks an infinite-scroll feed in a real browser and reacts to every post
//! the signed-in viewer has not reacted to yet, until a target count is
//! reached or the run deadline passes.

pub mod browser;
pub mod cli;
pub mod commands;
pub mod config;
pub mod crawl;
pub mod error;
