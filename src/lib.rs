//! Relays issue-tracker activity into a Telegram chat.
//!
//! The [`poller`] periodically fetches the tracker's notification feed and
//! recently updated issues through a [`tracker::TrackerClient`], drops
//! notifications that were already delivered, renders the rest with
//! [`render`] and sends them to the chat. [`commands`] handles the other
//! direction: creating issues from chat messages.

pub mod cache;
pub mod commands;
pub mod config;
pub mod decode;
pub mod extract;
pub mod logger;
pub mod poller;
pub mod render;
pub mod telegram;
pub mod tracker;
