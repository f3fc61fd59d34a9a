pub mod config;
pub mod session;

pub use config::{AppConfig, ServerConfig, TransportSecurity};
pub use session::{
    ErrorResponse, GetSessionRequest, ResolveSessionResponse, SessionResponse, TokenRequest,
};
