pub mod audio;
pub mod config;
pub mod controller;
pub mod events;
pub mod hotkey;
pub mod hub;
#[cfg(test)]
mod mock;
pub mod popup;
pub mod resolver;
