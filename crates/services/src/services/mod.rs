pub mod catalog;
pub mod database_validator;
pub mod fulfillment;
pub mod shift;
pub mod shift_clock;
