//! The document sequence and its operations.
//!
//! A [`Document`] is an ordered run of [`Character`]s bounded by two
//! invisible sentinels. Deletion tombstones a character in place, never
//! removes it; tombstones keep remote insert intents resolvable for the
//! lifetime of the session.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::CharId;

/// Errors surfaced by document operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrdtError {
    /// A local mutation addressed a visible index outside the document.
    #[error("position {0} out of bounds")]
    PositionOutOfBounds(usize),
    /// An identifier decoded to the empty string. Cannot happen with
    /// correct minting; indicates a bug or a corrupt snapshot.
    #[error("empty character identifier")]
    EmptyIdentifier,
    /// An identifier that is neither a sentinel nor `<site>.<clock>`.
    #[error("malformed character identifier {0:?}")]
    MalformedIdentifier(String),
    /// A remote insert referenced a neighbor this replica has not seen.
    /// Recoverable: drop the operation and wait for a document sync.
    #[error("prerequisite character {0} not present")]
    MissingPrerequisite(CharId),
}

/// The atomic unit of the shared document.
///
/// `prev_id` and `next_id` record which characters this one was placed
/// between at insertion time. They are intent, not live pointers: later
/// inserts around this character never rewrite them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharId,
    pub value: char,
    pub visible: bool,
    pub prev_id: CharId,
    pub next_id: CharId,
}

impl Character {
    fn sentinel(id: CharId) -> Self {
        Character {
            id,
            value: '\0',
            visible: false,
            prev_id: CharId::Start,
            next_id: CharId::End,
        }
    }
}

/// An ordered, convergent character sequence.
///
/// `site_id` and `local_clock` are replica-local minting state and are
/// deliberately excluded from serialization: a snapshot adopted from a
/// peer must not overwrite the identity of the replica that loads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    characters: Vec<Character>,
    #[serde(skip)]
    site_id: u64,
    #[serde(skip)]
    local_clock: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A document containing only the two sentinels.
    pub fn new() -> Self {
        Document {
            characters: vec![
                Character::sentinel(CharId::Start),
                Character::sentinel(CharId::End),
            ],
            site_id: 0,
            local_clock: 0,
        }
    }

    /// The visible text.
    pub fn content(&self) -> String {
        self.characters
            .iter()
            .filter(|c| c.visible)
            .map(|c| c.value)
            .collect()
    }

    /// Total number of characters, sentinels and tombstones included.
    pub fn length(&self) -> usize {
        self.characters.len()
    }

    /// Number of visible characters.
    pub fn visible_len(&self) -> usize {
        self.characters.iter().filter(|c| c.visible).count()
    }

    /// The whole sequence in document order.
    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn site_id(&self) -> u64 {
        self.site_id
    }

    pub fn local_clock(&self) -> u64 {
        self.local_clock
    }

    /// Adopt the server-assigned site id.
    ///
    /// Re-derives the local clock from any characters already minted under
    /// that site so future ids cannot collide with a loaded snapshot.
    pub fn set_site_id(&mut self, site_id: u64) {
        self.site_id = site_id;
        self.rebase_clock();
    }

    /// Replace this replica's sequence wholesale with a synced snapshot,
    /// keeping the local identity.
    pub fn adopt(&mut self, snapshot: Document) {
        self.characters = snapshot.characters;
        self.rebase_clock();
    }

    pub(crate) fn rebase_clock(&mut self) {
        self.local_clock = self
            .characters
            .iter()
            .filter_map(|c| match c.id {
                CharId::Site { site, clock } if site == self.site_id => Some(clock),
                _ => None,
            })
            .max()
            .unwrap_or(0);
    }

    /// The `position`-th visible character, 1-based.
    pub fn ith_visible(&self, position: usize) -> Option<&Character> {
        if position == 0 {
            return None;
        }
        self.characters
            .iter()
            .filter(|c| c.visible)
            .nth(position - 1)
    }

    /// The character with the given id.
    pub fn find(&self, id: &CharId) -> Option<&Character> {
        self.characters.iter().find(|c| &c.id == id)
    }

    pub fn contains(&self, id: &CharId) -> bool {
        self.position_of(id).is_some()
    }

    /// 0-based index of the character with the given id, tombstones and
    /// sentinels counted.
    pub fn position_of(&self, id: &CharId) -> Option<usize> {
        self.characters.iter().position(|c| &c.id == id)
    }

    /// Insert `value` at the 1-based visible index `position`, between the
    /// `position-1`-th and `position`-th visible characters.
    ///
    /// Mints a fresh id under this replica's site, records the visible
    /// neighbors as intent (falling back to the sentinels), integrates,
    /// and returns the minted character together with the new text.
    pub fn insert(&mut self, position: usize, value: char) -> Result<(Character, String), CrdtError> {
        if position == 0 || position > self.visible_len() + 1 {
            return Err(CrdtError::PositionOutOfBounds(position));
        }

        self.local_clock += 1;
        let id = CharId::site(self.site_id, self.local_clock);

        let prev_id = self
            .ith_visible(position - 1)
            .map(|c| c.id.clone())
            .unwrap_or(CharId::Start);
        let next_id = self
            .ith_visible(position)
            .map(|c| c.id.clone())
            .unwrap_or(CharId::End);

        let character = Character {
            id,
            value,
            visible: true,
            prev_id: prev_id.clone(),
            next_id: next_id.clone(),
        };

        self.integrate_insert(character.clone(), &prev_id, &next_id)?;
        Ok((character, self.content()))
    }

    /// Tombstone the `position`-th visible character, 1-based.
    ///
    /// Positions outside `[1, visible_len]` are a no-op that returns the
    /// unchanged text. Returns the tombstoned character so callers can put
    /// it on the wire.
    pub fn delete(&mut self, position: usize) -> (Option<Character>, String) {
        let id = match self.ith_visible(position) {
            Some(c) => c.id.clone(),
            None => return (None, self.content()),
        };
        self.integrate_delete(&id);
        let deleted = self.find(&id).cloned();
        (deleted, self.content())
    }

    /// Integrate a remote insert between `prev` and `next`.
    ///
    /// If other characters already occupy that interval, the new character
    /// is placed among them deterministically by id order: walk the
    /// strictly-between subsequence past every id that orders before ours,
    /// then recurse on the narrowed interval. Each recursion strictly
    /// narrows, so this terminates.
    ///
    /// A duplicate id is suppressed; an unknown `prev` or `next` is
    /// [`CrdtError::MissingPrerequisite`] and leaves the replica untouched.
    pub fn integrate_insert(
        &mut self,
        character: Character,
        prev: &CharId,
        next: &CharId,
    ) -> Result<(), CrdtError> {
        if self.contains(&character.id) {
            return Ok(());
        }

        let lo = self
            .position_of(prev)
            .ok_or_else(|| CrdtError::MissingPrerequisite(prev.clone()))?;
        let hi = self
            .position_of(next)
            .ok_or_else(|| CrdtError::MissingPrerequisite(next.clone()))?;
        if hi <= lo {
            // Inverted bounds mean the interval does not exist on this
            // replica yet; treat it like a missing prerequisite.
            return Err(CrdtError::MissingPrerequisite(next.clone()));
        }

        if hi - lo == 1 {
            self.characters.insert(hi, character);
            return Ok(());
        }

        let between = &self.characters[lo + 1..hi];
        let mut skipped = 0;
        while skipped < between.len() && between[skipped].id < character.id {
            skipped += 1;
        }
        let narrowed_prev = if skipped == 0 {
            prev.clone()
        } else {
            between[skipped - 1].id.clone()
        };
        let narrowed_next = if skipped == between.len() {
            next.clone()
        } else {
            between[skipped].id.clone()
        };
        self.integrate_insert(character, &narrowed_prev, &narrowed_next)
    }

    /// Integrate a remote delete: flip `visible` off for the matching id.
    ///
    /// Deleting an unknown id is a tolerated no-op, and the operation is
    /// idempotent.
    pub fn integrate_delete(&mut self, id: &CharId) {
        if let Some(character) = self.characters.iter_mut().find(|c| &c.id == id) {
            character.visible = false;
        }
    }
}
