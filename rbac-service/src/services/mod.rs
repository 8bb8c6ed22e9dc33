pub mod audit;
pub mod auth;
pub mod email;
pub mod jwt;

pub use audit::AuditRecorder;
pub use auth::AuthService;
pub use email::{DevMailer, Mailer};
pub use jwt::{Claims, JwtService};
