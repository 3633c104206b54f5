// Domain layer - Queue entities, policies and errors

pub mod errors;
pub mod model;
pub mod rules;
