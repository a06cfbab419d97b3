use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking — no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: Users, needs, offers

CREATE TABLE users (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'requester',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE needs (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    category TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'open',
    created_at TEXT NOT NULL,
    FOREIGN KEY (owner_id) REFERENCES users(id)
);

CREATE INDEX idx_needs_owner ON needs(owner_id);

CREATE TABLE offers (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    category TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    helped_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    FOREIGN KEY (owner_id) REFERENCES users(id)
);

CREATE INDEX idx_offers_owner ON offers(owner_id);
",
        ),
        M::up(
            "-- Migration 2: Matches

-- pair_key is the normalized (need_id, offer_id) pair ('-' for an absent
-- side). The UNIQUE index enforces at-most-one-match-per-pair at the store
-- layer, closing the concurrent read-then-write race.
CREATE TABLE matches (
    id TEXT PRIMARY KEY,
    need_id TEXT,
    offer_id TEXT,
    pair_key TEXT NOT NULL UNIQUE,
    initiated_by TEXT NOT NULL,
    responded_by TEXT,
    message TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (need_id) REFERENCES needs(id),
    FOREIGN KEY (offer_id) REFERENCES offers(id),
    FOREIGN KEY (initiated_by) REFERENCES users(id)
);

CREATE INDEX idx_matches_need ON matches(need_id);
CREATE INDEX idx_matches_offer ON matches(offer_id);
CREATE INDEX idx_matches_initiator ON matches(initiated_by);
",
        ),
        M::up(
            "-- Migration 3: Conversations and messages

-- participant_key is the sorted, '|'-joined participant id set. The UNIQUE
-- index guarantees no two conversations share the exact same participant set.
CREATE TABLE conversations (
    id TEXT PRIMARY KEY,
    participant_key TEXT NOT NULL UNIQUE,
    last_message TEXT,
    last_message_at TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE conversation_participants (
    conversation_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    PRIMARY KEY (conversation_id, user_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX idx_conv_participants_user ON conversation_participants(user_id);

-- seq is a per-conversation server-assigned sequence; ordering within a
-- conversation is commit order.
CREATE TABLE messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    content TEXT NOT NULL,
    read INTEGER NOT NULL DEFAULT 0,
    seq INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX idx_messages_conv_seq ON messages(conversation_id, seq);
CREATE INDEX idx_messages_unread ON messages(conversation_id, read, sender_id);
",
        ),
        M::up(
            "-- Migration 4: Notifications and announcements

CREATE TABLE notifications (
    id TEXT PRIMARY KEY,
    recipient_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    kind TEXT NOT NULL,
    entity_id TEXT,
    read INTEGER NOT NULL DEFAULT 0,
    action_taken INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    FOREIGN KEY (recipient_id) REFERENCES users(id)
);

CREATE INDEX idx_notifications_recipient ON notifications(recipient_id, read);

CREATE TABLE announcements (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    body TEXT,
    important INTEGER NOT NULL DEFAULT 0,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (created_by) REFERENCES users(id)
);
",
        ),
    ])
}
