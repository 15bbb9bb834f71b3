#![forbid(unsafe_code)]

//! Network feed for the brook streaming player.
//!
//! [`HttpClient`] performs plain and ranged GET requests. [`HttpFeed`] wraps
//! it into the callback-style [`Feed`] contract used by the player's driver
//! thread: response headers, byte chunks of arbitrary size, and a single
//! completion message, all delivered over a [`kanal`] channel.

mod client;
mod error;
mod feed;
mod traits;
mod types;

pub use crate::{
    client::HttpClient,
    error::{NetError, NetResult},
    feed::{Feed, FeedMessage, FeedRequest, FeedSender, HttpFeed},
    traits::{ByteResponse, ByteStream, Net},
    types::{Headers, NetOptions, RangeSpec},
};
