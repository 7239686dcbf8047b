pub mod bank;
pub mod cycle;
pub mod macros;
pub mod session;

pub use bank::*;
pub use cycle::*;
pub use session::*;

crate::define_id_type!(i64, BankId);
crate::define_id_type!(i64, SessionId);
crate::define_id_type!(i64, CycleId);
crate::define_id_type!(i64, ReadingId);
