//! Domain Layer
//!
//! Entities, value objects, ports and pure services of the control plane.

pub mod entities;
pub mod events;
pub mod ports;
pub mod services;
pub mod value_objects;
