//! One-shot, memoized auth initialization

use log::{debug, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

use crate::auth::{IdentityHandle, IdentityProvider};
use crate::config::RenderMode;
use crate::session::ProfileReconciler;
use crate::store::ProfileStore;

/// Where the gate stands for this page load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializationState {
    Uninitialized,
    Initializing,
    /// The pass completed; `true` when it ended authenticated
    Ready(bool),
}

enum GateState {
    Uninitialized,
    Initializing(watch::Receiver<Option<bool>>),
    Ready(bool),
}

struct GateInner {
    provider: Arc<dyn IdentityProvider>,
    store: ProfileStore,
    reconciler: Arc<ProfileReconciler>,
    render: RenderMode,
    state: Mutex<GateState>,
    passes: AtomicUsize,
}

/// Single-flight initializer shared by guards and the watcher.
///
/// At most one initialization pass runs per gate. The pass is spawned on
/// its own task, so a caller that stops waiting (a guard timeout) neither
/// cancels it nor causes a second one.
#[derive(Clone)]
pub struct AuthGate {
    inner: Arc<GateInner>,
}

impl AuthGate {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: ProfileStore,
        reconciler: Arc<ProfileReconciler>,
        render: RenderMode,
    ) -> Self {
        Self {
            inner: Arc::new(GateInner {
                provider,
                store,
                reconciler,
                render,
                state: Mutex::new(GateState::Uninitialized),
                passes: AtomicUsize::new(0),
            }),
        }
    }

    pub fn initialization_state(&self) -> InitializationState {
        match &*self.inner.lock() {
            GateState::Uninitialized => InitializationState::Uninitialized,
            GateState::Initializing(_) => InitializationState::Initializing,
            GateState::Ready(result) => InitializationState::Ready(*result),
        }
    }

    /// Number of initialization passes started, at most one
    pub fn passes(&self) -> usize {
        self.inner.passes.load(Ordering::SeqCst)
    }

    /// Wait for the auth state to be trustworthy.
    ///
    /// The first caller starts the pass and gets its result, concurrent
    /// callers share that result, later callers get `true` at once.
    pub async fn ensure_initialized(&self) -> bool {
        let mut rx = {
            let mut state = self.inner.lock();
            match &*state {
                GateState::Ready(_) => return true,
                GateState::Initializing(rx) => rx.clone(),
                GateState::Uninitialized => {
                    let (tx, rx) = watch::channel(None);
                    *state = GateState::Initializing(rx.clone());
                    self.inner.passes.fetch_add(1, Ordering::SeqCst);

                    let inner = self.inner.clone();
                    tokio::spawn(async move {
                        let result = inner.initialize_auth().await;
                        *inner.lock() = GateState::Ready(result);
                        tx.send_replace(Some(result));
                    });
                    rx
                }
            }
        };

        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map(|result| *result == Some(true));
        match outcome {
            Ok(authenticated) => authenticated,
            Err(_) => {
                warn!("auth initialization ended without a result");
                false
            }
        }
    }

    /// Run one initialization pass directly, bypassing the single-flight
    /// bookkeeping
    pub async fn initialize_auth(&self) -> bool {
        self.inner.initialize_auth().await
    }
}

impl GateInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn initialize_auth(&self) -> bool {
        let handle = self.provider.current_user();

        if self.render == RenderMode::Server {
            // no store or database on the server, only the handle counts
            return handle.as_ref().and_then(IdentityHandle::id).is_some();
        }

        match handle.as_ref().and_then(IdentityHandle::identity) {
            Some(identity) if self.store.is_synced_with(&identity.id) => {
                debug!("store already synced with {}", identity.id);
                self.store.refresh_derived();
                true
            }
            Some(_) => self.reconciler.ensure_user_profile(handle.as_ref()).await,
            None if self.store.has_valid_session() => {
                debug!("no confirmed identity yet, trusting the restored session");
                self.store.refresh_derived();
                true
            }
            None => {
                self.store.reset();
                false
            }
        }
    }
}
