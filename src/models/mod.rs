mod message;
mod outcome;
mod payment_session;
mod reconciliation;
mod verification;

pub use message::*;
pub use outcome::*;
pub use payment_session::*;
pub use reconciliation::*;
pub use verification::*;
