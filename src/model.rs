use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Area segment used in catalog keys when no area is selected.
pub const ALL_AREAS: &str = "ALL";

/// Status a user assigns to a sign while walking a site.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignStatus {
    Present,
    Missing,
    Damaged,
    #[default]
    Unset,
}

impl SignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignStatus::Present => "present",
            SignStatus::Missing => "missing",
            SignStatus::Damaged => "damaged",
            SignStatus::Unset => "unset",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "present" => Some(SignStatus::Present),
            "missing" => Some(SignStatus::Missing),
            "damaged" => Some(SignStatus::Damaged),
            "unset" => Some(SignStatus::Unset),
            _ => None,
        }
    }

    /// The inventory type recorded remotely, or `None` while unset.
    pub fn inventory_type(&self) -> Option<InventoryType> {
        match self {
            SignStatus::Present => Some(InventoryType::Present),
            SignStatus::Missing => Some(InventoryType::Missing),
            SignStatus::Damaged => Some(InventoryType::Damaged),
            SignStatus::Unset => None,
        }
    }
}

/// Recorded outcome for one sign in the remote inventory log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InventoryType {
    Present,
    Missing,
    Damaged,
}

impl InventoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryType::Present => "present",
            InventoryType::Missing => "missing",
            InventoryType::Damaged => "damaged",
        }
    }
}

/// Free-text columns carried over from the spreadsheet import.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegacyImport {
    #[serde(rename = "original_csv_notes", default)]
    pub notes: Option<String>,
    #[serde(rename = "original_csv_level_no", default)]
    pub level_no: Option<String>,
    #[serde(rename = "original_csv_location_plan", default)]
    pub location_plan: Option<String>,
}

/// One catalogued physical sign. Read-only reference data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignCatalogEntry {
    pub id: String,
    pub site_id: String,
    #[serde(default)]
    pub area_id: Option<String>,
    pub sign_number: String,
    #[serde(rename = "sign_description_id", default)]
    pub description_id: Option<String>,
    #[serde(default)]
    pub side_a_message: Option<String>,
    #[serde(default)]
    pub side_b_message: Option<String>,
    #[serde(flatten)]
    pub legacy: LegacyImport,
    /// Joined from the description table when fetched remotely.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sign_type_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Area {
    pub id: String,
    pub site_id: String,
    #[serde(rename = "area_name")]
    pub name: String,
}

/// Site plus optional area a checklist is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub site_id: String,
    pub area_id: Option<String>,
}

impl Scope {
    pub fn new(site_id: impl Into<String>, area_id: Option<impl Into<String>>) -> Self {
        Self {
            site_id: site_id.into(),
            area_id: area_id.map(Into::into),
        }
    }

    pub fn site(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            area_id: None,
        }
    }

    pub fn area_id(&self) -> Option<&str> {
        self.area_id.as_deref()
    }

    /// `site_area` or `site_ALL`.
    pub fn catalog_key(&self) -> String {
        format!("{}_{}", self.site_id, self.area_id().unwrap_or(ALL_AREAS))
    }

    /// `site_area`, or just `site` when no area is selected.
    pub fn draft_key(&self) -> String {
        match self.area_id() {
            Some(area) => format!("{}_{}", self.site_id, area),
            None => self.site_id.clone(),
        }
    }
}

/// Frozen copy of a catalog entry inside a draft, plus its mark.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftSign {
    pub id: String,
    pub sign_number: String,
    #[serde(default)]
    pub description_id: Option<String>,
    #[serde(default)]
    pub sign_type_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub side_a_message: Option<String>,
    #[serde(default)]
    pub side_b_message: Option<String>,
    #[serde(default)]
    pub status: SignStatus,
}

impl From<&SignCatalogEntry> for DraftSign {
    fn from(entry: &SignCatalogEntry) -> Self {
        Self {
            id: entry.id.clone(),
            sign_number: entry.sign_number.clone(),
            description_id: entry.description_id.clone(),
            sign_type_code: entry.sign_type_code.clone(),
            description: entry.description.clone(),
            side_a_message: entry.side_a_message.clone(),
            side_b_message: entry.side_b_message.clone(),
            status: SignStatus::Unset,
        }
    }
}

/// In-progress checklist persisted per (site, area).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveInventoryDraft {
    pub key: String,
    pub site_id: String,
    pub area_id: Option<String>,
    pub site_name: Option<String>,
    pub area_name: Option<String>,
    pub signs: Vec<DraftSign>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl ActiveInventoryDraft {
    pub fn marked(&self) -> impl Iterator<Item = &DraftSign> {
        self.signs.iter().filter(|s| s.status != SignStatus::Unset)
    }
}

/// Inventory log row awaiting insert; the remote assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingInventoryRecord {
    pub session_id: String,
    pub site_id: String,
    pub inventory_type: InventoryType,
    pub sign_number: String,
    #[serde(rename = "sign_description_id", default, skip_serializing_if = "Option::is_none")]
    pub description_id: Option<String>,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Inventory log row as confirmed by the remote service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryRecord {
    pub id: String,
    pub session_id: String,
    pub site_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub inventory_type: InventoryType,
    pub sign_number: String,
    #[serde(rename = "sign_description_id", default)]
    pub description_id: Option<String>,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QueueKind {
    InventoryRecords,
}

impl QueueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::InventoryRecords => "inventory_records",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "inventory_records" => Some(QueueKind::InventoryRecords),
            _ => None,
        }
    }
}

/// Body of a queued write. Stored as tagged JSON so the variant survives the round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum QueuePayload {
    InventoryRecords(Vec<PendingInventoryRecord>),
}

impl QueuePayload {
    pub fn kind(&self) -> QueueKind {
        match self {
            QueuePayload::InventoryRecords(_) => QueueKind::InventoryRecords,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            QueuePayload::InventoryRecords(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncQueueItem {
    pub id: i64,
    pub payload: QueuePayload,
    pub enqueued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalog_and_draft_keys() {
        let with_area = Scope::new("s1", Some("a1"));
        assert_eq!(with_area.catalog_key(), "s1_a1");
        assert_eq!(with_area.draft_key(), "s1_a1");

        let site_only = Scope::site("s1");
        assert_eq!(site_only.catalog_key(), "s1_ALL");
        assert_eq!(site_only.draft_key(), "s1");
    }

    #[test]
    fn catalog_entry_reads_wire_shape() {
        let entry: SignCatalogEntry = serde_json::from_value(json!({
            "id": "c1",
            "site_id": "s1",
            "sign_number": "EX-01",
            "sign_description_id": "d1",
            "original_csv_level_no": "Level 2",
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(entry.description_id.as_deref(), Some("d1"));
        assert_eq!(entry.legacy.level_no.as_deref(), Some("Level 2"));
        assert!(entry.area_id.is_none());
        assert!(entry.description.is_none());
    }

    #[test]
    fn queue_payload_is_tagged() {
        let payload = QueuePayload::InventoryRecords(vec![PendingInventoryRecord {
            session_id: "offline-1".into(),
            site_id: "s1".into(),
            inventory_type: InventoryType::Missing,
            sign_number: "EX-01".into(),
            description_id: None,
            quantity: 1,
            notes: None,
        }]);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "inventory_records");
        assert_eq!(value["data"][0]["inventory_type"], "missing");
        assert!(value["data"][0].get("notes").is_none());
        assert_eq!(payload.kind(), QueueKind::InventoryRecords);
    }

    #[test]
    fn unset_status_has_no_inventory_type() {
        assert_eq!(SignStatus::Unset.inventory_type(), None);
        assert_eq!(
            SignStatus::Damaged.inventory_type(),
            Some(InventoryType::Damaged)
        );
        assert_eq!(SignStatus::parse_status("present"), Some(SignStatus::Present));
        assert_eq!(SignStatus::parse_status("bogus"), None);
    }
}
