//! # Event Bus Module
//!
//! Publish/subscribe channel between the toolpath and streaming core and the
//! presentation layer.
//!
//! - Publishers emit typed events without knowing subscribers
//! - Subscribers filter by category and receive events synchronously or
//!   through a broadcast receiver
//!
//! ## Usage
//!
//! ```rust,ignore
//! use plotkit_core::event_bus::{event_bus, AppEvent, EventCategory, EventFilter};
//!
//! let subscription = event_bus().subscribe(
//!     EventFilter::Categories(vec![EventCategory::Streaming]),
//!     |event| println!("{}", event.description()),
//! );
//!
//! event_bus().publish(AppEvent::info("cli", "starting"));
//! event_bus().unsubscribe(subscription);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
