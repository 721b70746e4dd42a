//! Client identity and host-side authorization

pub mod acl;
pub mod error;
pub mod identity;
pub mod principal;

pub use acl::{Access, AccessList, AuthorizedEntry};
pub use error::{AuthError, AuthResult};
pub use identity::Identity;
pub use principal::Principal;
