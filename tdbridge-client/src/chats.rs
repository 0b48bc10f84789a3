//! Chat-id encoding and the set of chats already prepared for use.
//!
//! The id encoding is fixed by the transport and must be reproduced
//! bit-for-bit: non-negative ids address private chats, negative ids with
//! magnitude below 10^12 address basic groups, and negative ids at or beyond
//! that threshold address supergroups/channels, where the magnitude minus the
//! threshold is the underlying supergroup id.

use std::collections::HashSet;

/// Magnitude threshold separating basic-group ids from supergroup ids.
const SUPERGROUP_ID_BASE: i64 = 1_000_000_000_000;

// ─── ChatKind ─────────────────────────────────────────────────────────────────

/// The three disjoint context kinds a chat id can encode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    /// One-on-one chat; the id doubles as the user id.
    Private { user_id: i64 },
    /// Basic (small) group.
    Group { basic_group_id: i64 },
    /// Supergroup or broadcast channel.
    Channel { supergroup_id: i64 },
}

/// Classify a chat id into its kind, recovering the kind-specific identifier.
pub fn classify(chat_id: i64) -> ChatKind {
    if chat_id >= 0 {
        return ChatKind::Private { user_id: chat_id };
    }
    // unsigned_abs: negating i64::MIN directly would overflow.
    let magnitude = chat_id.unsigned_abs();
    if magnitude < SUPERGROUP_ID_BASE as u64 {
        ChatKind::Group { basic_group_id: magnitude as i64 }
    } else {
        ChatKind::Channel { supergroup_id: (magnitude - SUPERGROUP_ID_BASE as u64) as i64 }
    }
}

// ─── InitializedChats ─────────────────────────────────────────────────────────

/// Chats confirmed ready for operations.
///
/// Grows monotonically within a session — chats never un-initialize — and
/// membership is the idempotency guard for the preparation sequence.
#[derive(Default)]
pub struct InitializedChats {
    set: HashSet<i64>,
}

impl InitializedChats {
    pub fn contains(&self, chat_id: i64) -> bool {
        self.set.contains(&chat_id)
    }

    pub fn mark(&mut self, chat_id: i64) {
        self.set.insert(chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_ranges() {
        assert_eq!(classify(0), ChatKind::Private { user_id: 0 });
        assert_eq!(classify(777_000), ChatKind::Private { user_id: 777_000 });
        assert_eq!(classify(-1), ChatKind::Group { basic_group_id: 1 });
        assert_eq!(
            classify(-999_999_999_999),
            ChatKind::Group { basic_group_id: 999_999_999_999 }
        );
        assert_eq!(
            classify(-1_000_000_000_000),
            ChatKind::Channel { supergroup_id: 0 }
        );
        assert_eq!(
            classify(-1_001_234_567_890),
            ChatKind::Channel { supergroup_id: 1_234_567_890 }
        );
    }

    #[test]
    fn extreme_ids_classify_without_overflow() {
        assert_eq!(
            classify(i64::MIN),
            ChatKind::Channel { supergroup_id: 9_223_371_036_854_775_808 }
        );
    }

    #[test]
    fn initialized_set_is_monotone() {
        let mut s = InitializedChats::default();
        assert!(!s.contains(42));
        s.mark(42);
        s.mark(42);
        assert!(s.contains(42));
    }
}
