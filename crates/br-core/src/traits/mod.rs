//! Core trait definitions

mod session;

pub use session::{ByteSink, InputStream, OutputStream, RemoteSession, SessionFactory};
