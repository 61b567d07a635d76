//! Core SMTP types.

mod address;
mod extension;
mod reply;
mod step;

pub use address::Address;
pub use extension::{AuthMechanism, Extension};
pub use reply::{Reply, ReplyCode};
pub use step::Step;
