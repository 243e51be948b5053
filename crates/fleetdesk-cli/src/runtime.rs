// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use fleetdesk_api::{Client, SignIn};
use fleetdesk_app::{Collection, CollectionEndpoint, RemoteActions, Session};
use fleetdesk_testkit::DEMO_TOKEN;
use std::sync::Arc;
use tracing::info;

pub trait Authenticator {
    fn authenticate(&self, identifier: &str, password: &str) -> Result<SignIn>;
}

impl Authenticator for Client {
    fn authenticate(&self, identifier: &str, password: &str) -> Result<SignIn> {
        self.sign_in(identifier, password)
    }
}

// The demo backend takes any non-empty password.
pub struct DemoAuthenticator;

impl Authenticator for DemoAuthenticator {
    fn authenticate(&self, identifier: &str, password: &str) -> Result<SignIn> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            bail!("sign-in identifier is required -- pass a username or email");
        }
        if password.is_empty() {
            bail!("password is required -- any password works in demo mode");
        }
        Ok(SignIn {
            jwt: DEMO_TOKEN.to_owned(),
            username: identifier.to_owned(),
        })
    }
}

pub struct RemoteRuntime {
    endpoint: Arc<dyn CollectionEndpoint>,
    authenticator: Arc<dyn Authenticator>,
    session: Arc<Session>,
}

impl RemoteRuntime {
    pub fn new(
        endpoint: Arc<dyn CollectionEndpoint>,
        authenticator: Arc<dyn Authenticator>,
        session: Arc<Session>,
    ) -> Self {
        Self {
            endpoint,
            authenticator,
            session,
        }
    }

    pub fn actions(&self, collection: Collection) -> RemoteActions {
        RemoteActions::new(collection, self.endpoint.clone(), self.session.clone())
    }

    pub fn authenticate(&self, identifier: &str, password: &str) -> Result<String> {
        let signed_in = self.authenticator.authenticate(identifier, password)?;
        self.session.sign_in(signed_in.jwt);
        info!(user = %signed_in.username, "signed in");
        Ok(signed_in.username)
    }
}

impl fleetdesk_tui::ConsoleRuntime for RemoteRuntime {
    fn remote(&mut self, collection: Collection) -> RemoteActions {
        self.actions(collection)
    }

    fn sign_in(&mut self, identifier: &str, password: &str) -> Result<String> {
        self.authenticate(identifier, password)
    }

    fn sign_out(&mut self) -> Result<()> {
        self.session.sign_out();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DemoAuthenticator, RemoteRuntime};
    use anyhow::Result;
    use fleetdesk_app::{Collection, FetchOutcome, Session};
    use fleetdesk_testkit::MemoryEndpoint;
    use fleetdesk_tui::ConsoleRuntime;
    use std::sync::Arc;

    fn demo_runtime(session: &Arc<Session>) -> RemoteRuntime {
        RemoteRuntime::new(
            Arc::new(MemoryEndpoint::demo(7)),
            Arc::new(DemoAuthenticator),
            session.clone(),
        )
    }

    #[test]
    fn remote_actions_follow_sign_in_and_out() -> Result<()> {
        let session = Arc::new(Session::new());
        let mut runtime = demo_runtime(&session);

        let remote = runtime.remote(Collection::Vehicles);
        assert_eq!(remote.fetch_rows()?, FetchOutcome::Deferred);

        assert_eq!(runtime.sign_in(" dispatch ", "pw")?, "dispatch");
        assert!(remote.has_token());
        let FetchOutcome::Loaded(batch) = remote.fetch_rows()? else {
            panic!("signed-in fetch should load rows");
        };
        assert_eq!(batch.rows.len(), 18);

        runtime.sign_out()?;
        assert!(!session.is_signed_in());
        assert_eq!(remote.fetch_rows()?, FetchOutcome::Deferred);
        Ok(())
    }

    #[test]
    fn failed_sign_in_leaves_the_session_empty() {
        let session = Arc::new(Session::new());
        let mut runtime = demo_runtime(&session);

        let error = runtime
            .sign_in("dispatch", "")
            .expect_err("empty password is rejected");
        assert!(error.to_string().contains("password is required"));
        let error = runtime
            .sign_in("  ", "pw")
            .expect_err("blank identifier is rejected");
        assert!(error.to_string().contains("identifier is required"));
        assert!(!session.is_signed_in());
    }
}
