pub mod auth;
pub mod backend_error;
pub mod clock;
pub mod collaborators;
pub mod distance_resolver;
pub mod in_memory;
pub mod rest_backend;
pub mod saga;
pub mod submitter;
