pub mod breakpoint;
pub mod classify;
pub mod config;
pub mod event;
#[cfg(test)]
pub mod mock;
pub mod registers;
pub mod resume;
pub mod stop;
pub mod target;
pub mod thread;
pub mod tracer;
pub mod waiter;
