//! Contact lifecycle
//!
//! Feedback from providers (bounces, complaints, deliveries), recipients
//! (unsubscribes) and the tracking endpoints (opens, clicks) all mutate
//! contacts, sends and campaign counters through [`ContactLifecycle`].
//! Suppression is one-way; nothing here ever reactivates a contact.

mod processor;
mod tracking;
mod unsubscribe;

pub use processor::ContactLifecycle;
pub use unsubscribe::UnsubscribeOutcome;
