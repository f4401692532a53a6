//! Reference-counted object lifecycle
//!
//! [`Object`] pairs a value with an optional name, an optional
//! [`Destructor`] and a reference count. Teardown happens synchronously when
//! the last handle is released.

mod handle;
mod teardown;

pub use handle::{Destructor, Object};
pub use teardown::Teardown;
