pub mod access;
pub mod session;

pub use access::{AccessPolicy, Operation};
pub use session::{Role, SessionContext, SessionStore, UserInfo};
