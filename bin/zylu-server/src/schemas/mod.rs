//! Request / response wire types, versioned per API surface.

pub mod v1;
