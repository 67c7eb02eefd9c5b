//! Capability sets carried by delegated grants.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// The set of extra capabilities a grant confers on top of plain
/// "may operate this lock" entitlement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// May retrieve the lock's operation log.
    pub view_log: bool,
    /// May enrol new access cards.
    pub add_card: bool,
    /// May issue further grants on the lock.
    pub share_auth: bool,
}

impl Capabilities {
    /// No extra capabilities. As a requirement, matches every grant.
    pub const NONE: Self = Self::new(false, false, false);
    pub const VIEW_LOG: Self = Self::new(true, false, false);
    pub const ADD_CARD: Self = Self::new(false, true, false);
    pub const SHARE_AUTH: Self = Self::new(false, false, true);
    pub const ALL: Self = Self::new(true, true, true);

    pub const fn new(view_log: bool, add_card: bool, share_auth: bool) -> Self {
        Self {
            view_log,
            add_card,
            share_auth,
        }
    }

    /// True if no capability bit is set.
    pub const fn is_empty(&self) -> bool {
        !self.view_log && !self.add_card && !self.share_auth
    }

    /// True if every bit set in `required` is also set in `self`.
    pub const fn contains(&self, required: Capabilities) -> bool {
        (!required.view_log || self.view_log)
            && (!required.add_card || self.add_card)
            && (!required.share_auth || self.share_auth)
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self::new(
            self.view_log || rhs.view_log,
            self.add_card || rhs.add_card,
            self.share_auth || rhs.share_auth,
        )
    }
}
