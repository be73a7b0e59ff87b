//! Pool of ONNX sessions handed out one request at a time

use crate::error::{Result, VisionError};
use crossbeam::channel::{bounded, Receiver, Sender};
use ort::session::Session;
use std::ops::{Deref, DerefMut};

/// Fixed-size set of sessions; a request owns one exclusively while it runs.
pub struct SessionPool {
    sender: Sender<Session>,
    receiver: Receiver<Session>,
    size: usize,
}

impl SessionPool {
    pub fn new(sessions: Vec<Session>) -> Result<Self> {
        if sessions.is_empty() {
            return Err(VisionError::Model("Session pool needs at least one session".to_string()));
        }
        let size = sessions.len();
        let (sender, receiver) = bounded(size);
        for session in sessions {
            sender
                .send(session)
                .map_err(|_| VisionError::Model("Session pool closed during setup".to_string()))?;
        }
        Ok(Self {
            sender,
            receiver,
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `f` against whichever session is free first
    pub fn with_any<T>(&self, f: impl FnOnce(&Session) -> T) -> Result<T> {
        let session = self.checkout()?;
        Ok(f(&session))
    }

    /// Block until a session is free
    pub fn checkout(&self) -> Result<PooledSession<'_>> {
        let session = self
            .receiver
            .recv()
            .map_err(|_| VisionError::Model("Session pool closed".to_string()))?;
        Ok(PooledSession {
            session: Some(session),
            pool: self,
        })
    }
}

/// Session checked out of a [`SessionPool`]; returned on drop.
pub struct PooledSession<'a> {
    session: Option<Session>,
    pool: &'a SessionPool,
}

impl Deref for PooledSession<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        // Only taken in Drop
        self.session.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledSession<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            // Capacity equals pool size, so this never blocks
            let _ = self.pool.sender.try_send(session);
        }
    }
}
