//! ServiceSource Connect - Subscription Entitlement Service
//!
//! Keeps each user's locally cached access level consistent with the
//! authoritative subscription state held by Stripe, under at-least-once,
//! possibly out-of-order webhook delivery and concurrent user-initiated
//! billing actions.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
