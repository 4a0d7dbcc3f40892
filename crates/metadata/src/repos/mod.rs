//! Repository traits for metadata operations.

pub mod bootstrap;
pub mod sites;
pub mod tokens;
pub mod users;

pub use bootstrap::BootstrapRepo;
pub use sites::SiteRepo;
pub use tokens::TokenRepo;
pub use users::UserRepo;
