mod extract;
mod server;
mod types;

pub use extract::AuthUser;
pub use server::jwt;
pub use types::*;
