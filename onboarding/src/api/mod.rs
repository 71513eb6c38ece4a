pub mod backend;
pub mod payments;

pub use backend::RestBackend;
pub use payments::PaymentProcessor;
