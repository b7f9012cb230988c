//! Ephemeral image hand-off.
//!
//! Uploaded images live in memory under an unguessable [`ImageId`] until they
//! are deleted, served through a [`Checkout`], or their TTL elapses,
//! whichever happens first.

mod id;
mod notifier;
mod sniff;
mod store;

pub use id::ImageId;
pub use notifier::{CALLBACK_TIMEOUT, DeliveryNotifier};
pub use sniff::{ImageKind, sniff_image};
pub use store::{Checkout, EphemeralStore, RemovalCause, StoreError};
