// Session management module
// Token codec, session store, per-user index, issuance policy and background sweep

pub mod index;
pub mod issuer;
pub mod storage;
pub mod sweeper;
pub mod token;
pub mod types;

pub use index::{IndexedToken, UserSessionIndex};
pub use issuer::{Issuance, MaintenanceReport, SessionIssuer};
pub use storage::{MemorySessionStore, SessionStore};
pub use sweeper::spawn_sweeper;
pub use token::{SessionToken, TOKEN_LEN, TokenCodec};
pub use types::{Session, SessionConfig, SessionStatus};
