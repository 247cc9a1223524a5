//! Business logic services (use cases).
//!
//! Services orchestrate repository calls, similarity scoring, and business
//! rules. They depend on traits (ports) -- never on concrete infrastructure
//! implementations.

pub mod failure;
pub mod identity;
pub mod memory;
