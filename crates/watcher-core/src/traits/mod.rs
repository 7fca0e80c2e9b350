//! Core traits for the watcher system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`UpstreamClient`]: Identity lookup and the filtered post stream
//! - [`MessagingBot`]: Inbound chat commands and outbound chat messages
//! - [`SubscriptionStore`]: Durable subscriber/account mapping

pub mod upstream;
pub mod messaging;
pub mod subscription_store;

pub use upstream::{Identity, Post, StreamMessage, StreamSession, UpstreamClient, UrlEntity};
pub use messaging::{InboundMessage, MessagingBot};
pub use subscription_store::{Subscriber, Subscription, SubscriptionStore, TrackedAccount};
