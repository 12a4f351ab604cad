//! Stowage CLI - resolve, build, and locate images in a local store.

pub mod commands;
