#![allow(unused_doc_comments)]
/**
 * File-top header comments are doc comments to rustc.
 * This allow statement keeps them from warning.
 */

/**
 * lib.rs
 */

pub mod overlay;

pub use overlay::{Core, Endpoint, EventBridge, OverlayConfig, RoomEvent};
