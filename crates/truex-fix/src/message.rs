//! Decoded FIX message representation.
//!
//! Fields keep their wire order so repeating groups can be walked in
//! sequence. Lookup helpers return the first occurrence, which is correct
//! for header and body singletons.

use crate::error::{FixError, FixResult};
use crate::fields::{tags, MsgType};

/// One entry of a repeating group: the fields between two delimiter tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupEntry {
    fields: Vec<(u32, String)>,
}

impl GroupEntry {
    /// First value for a tag within this entry.
    pub fn get(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    fn push(&mut self, tag: u32, value: String) {
        self.fields.push((tag, value));
    }

    fn contains(&self, tag: u32) -> bool {
        self.fields.iter().any(|(t, _)| *t == tag)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A parsed FIX message: ordered `tag=value` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixMessage {
    fields: Vec<(u32, String)>,
}

impl FixMessage {
    pub(crate) fn from_fields(fields: Vec<(u32, String)>) -> Self {
        Self { fields }
    }

    /// First value for a tag.
    pub fn get(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Required field accessor.
    pub fn require(&self, tag: u32) -> FixResult<&str> {
        self.get(tag).ok_or(FixError::MissingTag(tag))
    }

    /// Tag 35 as a known message type.
    pub fn msg_type(&self) -> FixResult<MsgType> {
        let raw = self.require(tags::MSG_TYPE)?;
        MsgType::parse(raw).ok_or_else(|| FixError::UnknownMsgType(raw.to_string()))
    }

    /// Raw tag 35 value, for logging unknown types.
    pub fn msg_type_raw(&self) -> Option<&str> {
        self.get(tags::MSG_TYPE)
    }

    /// Sequence number (tag 34).
    pub fn seq_num(&self) -> FixResult<u64> {
        let raw = self.require(tags::MSG_SEQ_NUM)?;
        raw.parse()
            .map_err(|_| FixError::MalformedFrame(format!("bad MsgSeqNum: {raw}")))
    }

    /// All fields in wire order.
    pub fn fields(&self) -> &[(u32, String)] {
        &self.fields
    }

    /// Walk a repeating group.
    ///
    /// `count_tag` announces the number of entries, `delimiter` is the first
    /// tag of each entry, and `members` the tags an entry may carry. Parsing
    /// stops at the first non-member tag, so unknown trailing fields are
    /// left untouched. A count that disagrees with the entries actually
    /// present is tolerated; callers get what was on the wire.
    pub fn groups(&self, count_tag: u32, delimiter: u32, members: &[u32]) -> Vec<GroupEntry> {
        let start = match self.fields.iter().position(|(t, _)| *t == count_tag) {
            Some(idx) => idx,
            None => return Vec::new(),
        };

        let mut entries = Vec::new();
        let mut current = GroupEntry::default();

        for (tag, value) in &self.fields[start + 1..] {
            if *tag == delimiter {
                if !current.is_empty() {
                    entries.push(std::mem::take(&mut current));
                }
                current.push(*tag, value.clone());
            } else if members.contains(tag) && !current.is_empty() {
                // Repeated member without a delimiter reset ends the group.
                if current.contains(*tag) {
                    break;
                }
                current.push(*tag, value.clone());
            } else {
                break;
            }
        }

        if !current.is_empty() {
            entries.push(current);
        }
        entries
    }
}
