pub mod capture;
pub mod notifier;
pub mod resolver;
mod writer;
