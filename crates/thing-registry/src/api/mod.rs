//! Construction of the [`ThingsApi`](crate::ThingsApi) facade.

mod builder;

pub use builder::ThingsApiBuilder;
