pub mod account;
pub mod token;

pub use account::AccountService;
pub use token::{Claims, CredentialService};
