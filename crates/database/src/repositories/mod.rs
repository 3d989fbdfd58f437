pub mod allow_list;
pub mod user;
pub mod utils;

pub use allow_list::PgAllowListRepository;
pub use user::PgUserRepository;
