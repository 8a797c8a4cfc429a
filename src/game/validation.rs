//! Validation module
//!
//! Stateless input validators. Every check returns a structured verdict
//! instead of an error: an invalid input is an expected outcome, not a
//! fault. Chat validation additionally produces a filtered rendering of
//! the message with flagged words masked.

use once_cell::sync::Lazy;

use crate::game::Position;

/// Substrings never allowed in player names, matched case-insensitively.
/// Also masked out of chat messages.
static FORBIDDEN_WORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "admin",
        "moderator",
        "system",
        "server",
        "gamemaster",
    ]
});

/// Maximum chat message length in characters
pub const CHAT_MAX_LEN: usize = 200;

/// Longest allowed run of identical consecutive characters in chat
pub const CHAT_MAX_RUN: usize = 5;

/// Maximum quantity of a single item stack
pub const ITEM_MAX_QUANTITY: u32 = 9999;

/// Verdict of a validation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Verdict of a chat check, carrying the masked message when valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatValidation {
    pub valid: bool,
    pub reason: Option<String>,
    /// The message with forbidden words masked; present only when valid
    pub filtered: Option<String>,
}

/// Axis-aligned world bounds for position checks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub min: Position,
    pub max: Position,
}

impl WorldBounds {
    /// Check whether a position lies inside the box (inclusive)
    pub fn contains(&self, position: &Position) -> bool {
        position.x >= self.min.x
            && position.x <= self.max.x
            && position.y >= self.min.y
            && position.y <= self.max.y
            && position.z >= self.min.z
            && position.z <= self.max.z
    }
}

/// Validate a player name: trimmed length in [3, 20] and free of
/// forbidden words
pub fn validate_player_name(name: &str) -> ValidationResult {
    let name = name.trim();
    let len = name.chars().count();
    if len < 3 {
        return ValidationResult::fail("name too short (minimum 3 characters)");
    }
    if len > 20 {
        return ValidationResult::fail("name too long (maximum 20 characters)");
    }

    let lowered = name.to_lowercase();
    for word in FORBIDDEN_WORDS.iter() {
        if lowered.contains(word) {
            return ValidationResult::fail(format!("name contains forbidden word '{word}'"));
        }
    }

    ValidationResult::ok()
}

/// Validate a currency transaction against the current balance and the
/// configured ceiling. A debit past zero or a credit past the ceiling is
/// rejected.
pub fn validate_currency_change(balance: i64, delta: i64, ceiling: i64) -> ValidationResult {
    let Some(new_balance) = balance.checked_add(delta) else {
        return ValidationResult::fail("transaction overflows balance");
    };
    if new_balance < 0 {
        return ValidationResult::fail("insufficient balance");
    }
    if new_balance > ceiling {
        return ValidationResult::fail("balance would exceed ceiling");
    }
    ValidationResult::ok()
}

/// Validate an item stack: non-empty id, quantity in (0, 9999]
pub fn validate_item(item_id: &str, quantity: u32) -> ValidationResult {
    if item_id.trim().is_empty() {
        return ValidationResult::fail("item id is empty");
    }
    if quantity == 0 {
        return ValidationResult::fail("quantity must be positive");
    }
    if quantity > ITEM_MAX_QUANTITY {
        return ValidationResult::fail(format!("quantity exceeds maximum of {ITEM_MAX_QUANTITY}"));
    }
    ValidationResult::ok()
}

/// Validate a world position: finite coordinates, optionally inside bounds
pub fn validate_position(position: &Position, bounds: Option<&WorldBounds>) -> ValidationResult {
    if !position.is_finite() {
        return ValidationResult::fail("position has non-finite coordinates");
    }
    if let Some(bounds) = bounds {
        if !bounds.contains(position) {
            return ValidationResult::fail("position is out of world bounds");
        }
    }
    ValidationResult::ok()
}

/// Validate a chat message and produce a masked rendering.
///
/// Rejects empty or over-length messages, and messages containing a run
/// of more than five identical consecutive characters.
pub fn validate_chat(message: &str) -> ChatValidation {
    if message.trim().is_empty() {
        return ChatValidation {
            valid: false,
            reason: Some("message is empty".to_string()),
            filtered: None,
        };
    }
    if message.chars().count() > CHAT_MAX_LEN {
        return ChatValidation {
            valid: false,
            reason: Some(format!("message exceeds {CHAT_MAX_LEN} characters")),
            filtered: None,
        };
    }
    if has_spam_run(message) {
        return ChatValidation {
            valid: false,
            reason: Some("message looks like spam (repeated characters)".to_string()),
            filtered: None,
        };
    }

    ChatValidation {
        valid: true,
        reason: None,
        filtered: Some(mask_forbidden_words(message.trim())),
    }
}

fn has_spam_run(message: &str) -> bool {
    let mut run = 0usize;
    let mut last: Option<char> = None;
    for c in message.chars() {
        if Some(c) == last {
            run += 1;
            if run > CHAT_MAX_RUN {
                return true;
            }
        } else {
            last = Some(c);
            run = 1;
        }
    }
    false
}

/// Replace every forbidden word in the message with asterisks, matching
/// case-insensitively but preserving the rest of the text.
///
/// Matching is ASCII-case-insensitive so byte offsets into the lowered
/// copy stay valid in the original.
fn mask_forbidden_words(message: &str) -> String {
    let mut filtered = message.to_string();
    for word in FORBIDDEN_WORDS.iter() {
        let lowered = filtered.to_ascii_lowercase();
        let mut search_from = 0;
        while let Some(offset) = lowered[search_from..].find(word) {
            let start = search_from + offset;
            let end = start + word.len();
            filtered.replace_range(start..end, &"*".repeat(word.len()));
            search_from = end;
        }
    }
    filtered
}
