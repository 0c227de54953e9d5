pub mod customer;
pub mod threshold;
