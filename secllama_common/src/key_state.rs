//! Observable lifecycle of the message encryption key.
//!
//! The key manager publishes every transition through a `tokio::sync::watch`
//! channel so the tray, the CLI and tests can observe initialization and
//! rotation without polling.
//!
//! ```text
//! Uninitialized -> Initializing -> Ready{g} -> Rotating{g} -> Ready{g+1}
//!                       |                           |
//!                       v                           v (abort)
//!                    Failed                      Ready{g}
//! ```
//!
//! # Example
//!
//! ```rust
//! use secllama_common::key_state::{KeyState, KeyStateMachine};
//!
//! let sm = KeyStateMachine::new();
//! sm.begin_initializing().unwrap();
//! sm.mark_ready().unwrap();
//! assert_eq!(sm.current(), KeyState::Ready { generation: 0 });
//! ```

use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle states of the working encryption key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyState {
    /// No initialization attempt has been made yet
    Uninitialized,

    /// The secret store is being queried or a fresh key is being persisted
    Initializing,

    /// A key is bound; `generation` counts completed rotations
    Ready { generation: u64 },

    /// A replacement key is being generated and persisted; the old key is still active
    Rotating { generation: u64 },

    /// Initialization failed; the manager will never become ready
    Failed { error: String },
}

impl KeyState {
    /// Returns true if encrypt/decrypt can be served
    pub fn is_ready(&self) -> bool {
        matches!(self, KeyState::Ready { .. } | KeyState::Rotating { .. })
    }

    /// Returns true if initialization failed
    pub fn is_failed(&self) -> bool {
        matches!(self, KeyState::Failed { .. })
    }

    /// Returns the active key generation, if any
    pub fn generation(&self) -> Option<u64> {
        match self {
            KeyState::Ready { generation } | KeyState::Rotating { generation } => {
                Some(*generation)
            }
            _ => None,
        }
    }
}

/// Key lifecycle state machine backed by a watch channel.
#[derive(Clone)]
pub struct KeyStateMachine {
    sender: Arc<watch::Sender<KeyState>>,
    // Keep a receiver to ensure the channel stays alive
    _receiver: watch::Receiver<KeyState>,
}

impl KeyStateMachine {
    /// Create a new state machine in the Uninitialized state
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(KeyState::Uninitialized);
        Self {
            sender: Arc::new(sender),
            _receiver: receiver,
        }
    }

    /// Get the current state without blocking
    pub fn current(&self) -> KeyState {
        self.sender.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<KeyState> {
        self.sender.subscribe()
    }

    /// Transition from Uninitialized to Initializing
    pub fn begin_initializing(&self) -> Result<(), &'static str> {
        self.transition(
            |state| matches!(state, KeyState::Uninitialized).then_some(KeyState::Initializing),
            "Can only begin initializing from Uninitialized",
        )
    }

    /// Transition from Initializing to Ready at generation 0
    pub fn mark_ready(&self) -> Result<(), &'static str> {
        self.transition(
            |state| {
                matches!(state, KeyState::Initializing).then_some(KeyState::Ready { generation: 0 })
            },
            "Can only become Ready from Initializing",
        )
    }

    /// Transition from Initializing to Failed
    pub fn mark_failed(&self, error: String) -> Result<(), &'static str> {
        self.transition(
            |state| {
                matches!(state, KeyState::Initializing).then(|| KeyState::Failed {
                    error: error.clone(),
                })
            },
            "Can only fail from Initializing",
        )
    }

    /// Transition from Ready to Rotating
    pub fn begin_rotation(&self) -> Result<(), &'static str> {
        self.transition(
            |state| match state {
                KeyState::Ready { generation } => Some(KeyState::Rotating {
                    generation: *generation,
                }),
                _ => None,
            },
            "Can only rotate from Ready",
        )
    }

    /// Transition from Rotating to Ready with the next generation.
    ///
    /// Returns the new generation.
    pub fn finish_rotation(&self) -> Result<u64, &'static str> {
        self.transition(
            |state| match state {
                KeyState::Rotating { generation } => Some(KeyState::Ready {
                    generation: generation + 1,
                }),
                _ => None,
            },
            "Can only finish a rotation from Rotating",
        )?;
        Ok(self.current().generation().unwrap_or_default())
    }

    /// Transition from Rotating back to Ready, keeping the old generation
    pub fn abort_rotation(&self) -> Result<(), &'static str> {
        self.transition(
            |state| match state {
                KeyState::Rotating { generation } => Some(KeyState::Ready {
                    generation: *generation,
                }),
                _ => None,
            },
            "Can only abort a rotation from Rotating",
        )
    }

    /// Wait until the key is usable - NO POLLING, uses watch channel.
    ///
    /// Returns the generation, or the initialization error.
    pub async fn wait_for_ready(&self) -> Result<u64, String> {
        let mut rx = self.sender.subscribe();
        loop {
            {
                let state = rx.borrow();
                match &*state {
                    KeyState::Ready { generation } | KeyState::Rotating { generation } => {
                        return Ok(*generation);
                    }
                    KeyState::Failed { error } => return Err(error.clone()),
                    _ => {}
                }
            }
            if rx.changed().await.is_err() {
                return Err("State machine dropped".to_string());
            }
        }
    }

    /// Check if currently usable
    pub fn is_ready(&self) -> bool {
        self.sender.borrow().is_ready()
    }

    fn transition(
        &self,
        next: impl Fn(&KeyState) -> Option<KeyState>,
        error: &'static str,
    ) -> Result<(), &'static str> {
        let mut transitioned = false;
        self.sender.send_if_modified(|state| match next(&*state) {
            Some(new_state) => {
                *state = new_state;
                transitioned = true;
                true
            }
            None => false,
        });
        if transitioned { Ok(()) } else { Err(error) }
    }
}

impl Default for KeyStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStateMachine")
            .field("state", &*self.sender.borrow())
            .finish()
    }
}
