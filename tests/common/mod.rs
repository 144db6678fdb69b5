#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use replica_link::{ClientSettings, DbError, Driver, ReadTarget, Result, Session};

/// Scripted in-memory driver. Every session shares one state so tests can
/// flip replica availability and inspect what the manager did.
#[derive(Clone, Default)]
pub struct FakeDriver {
    pub state: Arc<FakeState>,
}

#[derive(Default)]
pub struct FakeState {
    pub primary_down: AtomicBool,
    pub secondary_down: AtomicBool,
    pub refuse_connect: AtomicBool,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub pings: Mutex<Vec<ReadTarget>>,
    pub last_settings: Mutex<Option<ClientSettings>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_primary_down(&self, down: bool) {
        self.state.primary_down.store(down, Ordering::SeqCst);
    }

    pub fn set_secondary_down(&self, down: bool) {
        self.state.secondary_down.store(down, Ordering::SeqCst);
    }

    pub fn set_refuse_connect(&self, refuse: bool) {
        self.state.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> Vec<ReadTarget> {
        self.state.pings.lock().unwrap().clone()
    }

    pub fn last_settings(&self) -> Option<ClientSettings> {
        self.state.last_settings.lock().unwrap().clone()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    type Session = FakeSession;

    async fn connect(&self, settings: &ClientSettings) -> Result<FakeSession> {
        if self.state.refuse_connect.load(Ordering::SeqCst) {
            return Err(DbError::operation("server refused the handshake"));
        }
        let id = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.last_settings.lock().unwrap() = Some(settings.clone());
        Ok(FakeSession {
            id,
            state: Arc::clone(&self.state),
        })
    }
}

pub struct FakeSession {
    pub id: usize,
    state: Arc<FakeState>,
}

/// What an operation closure receives: enough to assert on routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeDatabase {
    pub name: String,
    pub target: Option<ReadTarget>,
    pub session_id: usize,
}

#[async_trait]
impl Session for FakeSession {
    type Database = FakeDatabase;

    async fn ping(&self, target: ReadTarget) -> Result<()> {
        self.state.pings.lock().unwrap().push(target);
        let down = match target {
            ReadTarget::Primary => self.state.primary_down.load(Ordering::SeqCst),
            ReadTarget::Secondary => self.state.secondary_down.load(Ordering::SeqCst),
        };
        if down {
            return Err(DbError::operation(format!("no {:?} available", target).to_lowercase()));
        }
        Ok(())
    }

    fn database(&self, name: &str, target: Option<ReadTarget>) -> FakeDatabase {
        FakeDatabase {
            name: name.to_string(),
            target,
            session_id: self.id,
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
