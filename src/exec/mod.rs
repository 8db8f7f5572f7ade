//! Asynchronous execution: the reactor/executor pair and the
//! completion-delivery contract every `async_*` socket operation goes
//! through.

mod completion;
mod executor;
mod poller;
mod reactor;

pub use self::completion::{Handler, Outcome, Waiter, blocking, callback, immediate};
pub use self::executor::{Driver, Exec};

pub(crate) use self::completion::{Delivery, Flight};
pub(crate) use self::reactor::{Command, Direction, Op, Progress};
