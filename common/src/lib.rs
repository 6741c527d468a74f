pub extern crate speedy;

#[macro_use]
extern crate speedy_derive;

pub mod event;
