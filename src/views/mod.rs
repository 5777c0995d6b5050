//! Derived views. Pure functions from the managers' collections to what a
//! screen shows; nothing here mutates or persists.

pub mod analytics;
pub mod dashboard;
pub mod finance;
pub mod goals;
pub mod journal;
pub mod weekly;
