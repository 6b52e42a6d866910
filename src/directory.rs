//! Ports to the member identity and accommodation inventory services.
//!
//! The engine only reads from these. The in-memory implementations back the
//! host binary (seeded from JSON files) and the tests.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::model::{AccommodationId, MemberId};

pub trait MemberDirectory: Send + Sync {
    /// Raw member-type tag as the identity service stores it.
    fn member_type_tag(&self, member: &MemberId) -> Option<String>;

    /// Whether `titular` is registered as the titular member of `member`.
    fn is_titular_of(&self, titular: &MemberId, member: &MemberId) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccommodationInfo {
    pub id: AccommodationId,
    pub location: String,
    /// Guest-count ceiling.
    pub capacity: u32,
}

pub trait Inventory: Send + Sync {
    fn accommodation(&self, id: &AccommodationId) -> Option<AccommodationInfo>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub id: MemberId,
    pub member_type: String,
    #[serde(default)]
    pub titular: Option<MemberId>,
}

#[derive(Default)]
pub struct InMemoryDirectory {
    members: DashMap<MemberId, MemberRecord>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: MemberRecord) {
        self.members.insert(record.id.clone(), record);
    }

    pub fn add_member(&self, id: &str, member_type: &str) {
        self.insert(MemberRecord {
            id: MemberId::from(id),
            member_type: member_type.to_string(),
            titular: None,
        });
    }

    pub fn add_dependent(&self, id: &str, member_type: &str, titular: &str) {
        self.insert(MemberRecord {
            id: MemberId::from(id),
            member_type: member_type.to_string(),
            titular: Some(MemberId::from(titular)),
        });
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Load a JSON array of member records.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<MemberRecord> = serde_json::from_str(json)?;
        let directory = Self::new();
        for record in records {
            directory.insert(record);
        }
        Ok(directory)
    }
}

impl MemberDirectory for InMemoryDirectory {
    fn member_type_tag(&self, member: &MemberId) -> Option<String> {
        self.members.get(member).map(|r| r.member_type.clone())
    }

    fn is_titular_of(&self, titular: &MemberId, member: &MemberId) -> bool {
        self.members
            .get(member)
            .is_some_and(|r| r.titular.as_ref() == Some(titular))
    }
}

#[derive(Default)]
pub struct InMemoryInventory {
    accommodations: DashMap<AccommodationId, AccommodationInfo>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, info: AccommodationInfo) {
        self.accommodations.insert(info.id.clone(), info);
    }

    pub fn add(&self, id: &str, location: &str, capacity: u32) {
        self.insert(AccommodationInfo {
            id: AccommodationId::from(id),
            location: location.to_string(),
            capacity,
        });
    }

    pub fn len(&self) -> usize {
        self.accommodations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accommodations.is_empty()
    }

    /// Load a JSON array of accommodations.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<AccommodationInfo> = serde_json::from_str(json)?;
        let inventory = Self::new();
        for info in entries {
            inventory.insert(info);
        }
        Ok(inventory)
    }
}

impl Inventory for InMemoryInventory {
    fn accommodation(&self, id: &AccommodationId) -> Option<AccommodationInfo> {
        self.accommodations.get(id).map(|e| e.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titular_relationship_is_directional() {
        let dir = InMemoryDirectory::new();
        dir.add_member("parent", "regular");
        dir.add_dependent("kid", "youthVisitor", "parent");

        let parent = MemberId::from("parent");
        let kid = MemberId::from("kid");
        assert!(dir.is_titular_of(&parent, &kid));
        assert!(!dir.is_titular_of(&kid, &parent));
        assert!(!dir.is_titular_of(&MemberId::from("stranger"), &kid));
        assert_eq!(dir.member_type_tag(&kid).as_deref(), Some("youthVisitor"));
        assert_eq!(dir.member_type_tag(&MemberId::from("nobody")), None);
    }

    #[test]
    fn seed_files_parse() {
        let dir = InMemoryDirectory::from_json(
            r#"[{"id": "m1", "member_type": "regular"},
                {"id": "k1", "member_type": "youthVisitor", "titular": "m1"}]"#,
        )
        .unwrap();
        assert_eq!(dir.len(), 2);
        assert!(dir.is_titular_of(&MemberId::from("m1"), &MemberId::from("k1")));

        let inv = InMemoryInventory::from_json(
            r#"[{"id": "cabin-7", "location": "lakeside", "capacity": 4}]"#,
        )
        .unwrap();
        let cabin = inv.accommodation(&AccommodationId::from("cabin-7")).unwrap();
        assert_eq!(cabin.location, "lakeside");
        assert_eq!(cabin.capacity, 4);
    }

    #[test]
    fn malformed_seed_is_an_error() {
        assert!(InMemoryDirectory::from_json("{not json").is_err());
        assert!(InMemoryInventory::from_json(r#"[{"id": "x"}]"#).is_err());
    }
}
