//! The permission gate in front of key material.

use crate::method::WalletMethod;
use serde::{Deserialize, Serialize};

/// How the embedding application presents the wallet.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum UiMode {
    /// No wallet UI at all, the application signs on the user's behalf.
    NoUi,
    /// Compact widget.
    Widget,
    /// Full wallet UI.
    #[default]
    Full,
}

/// Decides whether a call needs an explicit user decision before it is dispatched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PermissionPolicy {
    mode: UiMode,
}

impl PermissionPolicy {
    pub const fn new(mode: UiMode) -> Self {
        Self { mode }
    }

    pub const fn mode(&self) -> UiMode {
        self.mode
    }

    /// Returns `true` if `method` must be approved before it is dispatched.
    pub fn requires_approval(&self, method: &str) -> bool {
        requires_approval(method, self.mode)
    }
}

/// Returns `true` if `method` must be approved before it is dispatched under `mode`.
///
/// `NoUi` never asks. Otherwise the answer comes from
/// [`WalletMethod::requires_permission`]; methods the wallet doesn't intercept are relayed
/// queries and never ask either.
pub fn requires_approval(method: &str, mode: UiMode) -> bool {
    if mode == UiMode::NoUi {
        return false;
    }
    WalletMethod::parse(method).is_some_and(WalletMethod::requires_permission)
}
