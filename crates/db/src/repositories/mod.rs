//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Methods that must run inside a
//! caller-owned transaction take `&mut Transaction<'_, Postgres>` instead.

pub mod article_repo;
pub mod profile_repo;
pub mod team_repo;
pub mod template_repo;
pub mod ticket_repo;
pub mod ticket_update_repo;

pub use article_repo::ArticleRepo;
pub use profile_repo::ProfileRepo;
pub use team_repo::TeamRepo;
pub use template_repo::TemplateRepo;
pub use ticket_repo::TicketRepo;
pub use ticket_update_repo::TicketUpdateRepo;
