// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::Collection;

// None means not signed in yet.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct Session {
    jwt: RwLock<Option<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.sign_in(token);
        session
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        let token = token.into();
        let mut guard = match self.jwt.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = (!token.trim().is_empty()).then_some(token);
    }

    pub fn sign_out(&self) {
        let mut guard = match self.jwt.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
    }

    pub fn is_signed_in(&self) -> bool {
        self.bearer_token().is_some()
    }
}

impl TokenSource for Session {
    fn bearer_token(&self) -> Option<String> {
        let guard = match self.jwt.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("cannot reach {url} -- check [api].base_url and the network ({message})")]
    Unreachable { url: String, message: String },
    #[error("server error ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("decode {context}: {message}")]
    Decode { context: String, message: String },
}

pub trait CollectionEndpoint: Send + Sync {
    fn list(&self, collection: Collection, token: &str) -> Result<Vec<Value>, RemoteError>;
    fn get(&self, collection: Collection, key: &str, token: &str) -> Result<Value, RemoteError>;
    fn create(
        &self,
        collection: Collection,
        record: &Map<String, Value>,
        token: &str,
    ) -> Result<Value, RemoteError>;
    fn update(
        &self,
        collection: Collection,
        key: &str,
        record: &Map<String, Value>,
        token: &str,
    ) -> Result<Value, RemoteError>;
    fn delete(&self, collection: Collection, key: &str, token: &str) -> Result<(), RemoteError>;
}

#[derive(Debug, Clone)]
pub struct ViewLifetime(Arc<AtomicBool>);

impl ViewLifetime {
    pub fn mounted() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn unmount(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
