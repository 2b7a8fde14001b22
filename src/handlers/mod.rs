pub mod cleanup;
pub mod form;
pub mod health;
pub mod stylize;
