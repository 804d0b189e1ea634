pub mod commands;
pub mod events;
pub mod fare;
pub mod form;
pub mod navigation;
pub mod validation;
pub mod wizard;
