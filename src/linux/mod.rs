//! Linux X11 support module
//!
//! Provides the X11 display server adapter: connection and hints, event
//! classification, monitor layout and pixel grabbing.

pub mod capture;
pub mod connection;
pub mod display;
mod events;

pub use capture::X11Grabber;
pub use connection::X11Connection;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::server::{Connector, Session};
use std::sync::Arc;

/// Opens a fresh X11 connection per session
#[derive(Debug, Default, Clone, Copy)]
pub struct X11Connector;

impl Connector for X11Connector {
    fn connect(&self, config: &BackendConfig) -> Result<Session> {
        let conn = Arc::new(X11Connection::connect(config.display.as_deref())?);
        let grabber = Arc::new(X11Grabber::new(Arc::clone(&conn), config.use_shm));
        Ok(Session {
            server: conn,
            grabber,
        })
    }
}
