//! SSH-backed remote sessions

mod connector;
mod pipe;
mod session;

pub use connector::{load_credentials, SshSessionFactory};
pub use pipe::InputPipe;
pub use session::SshSession;
