use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub type ItemId = u64;
pub type FieldId = u64;
pub type RoleId = u64;
pub type RecordId = u64;

/// A point in page-relative percentage space, origin top-left.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Percent {
    pub x: f32,
    pub y: f32,
}

impl Percent {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn clamped(self) -> Self {
        Self {
            x: clamp_percent(self.x),
            y: clamp_percent(self.y),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PercentRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PercentRect {
    pub fn origin(self) -> Percent {
        Percent::new(self.x, self.y)
    }
}

pub fn clamp_percent(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 100.0) }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Signature,
    #[serde(other)]
    Unknown,
}

impl FieldKind {
    pub fn label(self) -> &'static str {
        match self {
            FieldKind::Text => "Text",
            FieldKind::Signature => "Signature",
            FieldKind::Unknown => "Unknown",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FieldDef {
    pub id: FieldId,
    pub name: String,
    #[serde(default)]
    pub field_type: FieldKind,
    #[serde(default, deserialize_with = "falsy_string")]
    pub default_value: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Role {
    #[serde(rename = "role_id")]
    pub id: RoleId,
    pub name: String,
    #[serde(default, deserialize_with = "falsy_id")]
    pub partner_id: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Partner {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "falsy_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "falsy_string")]
    pub phone: Option<String>,
}

impl Partner {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        match key {
            "name" if !self.name.is_empty() => Some(self.name.as_str()),
            "email" => self.email.as_deref(),
            "phone" => self.phone.as_deref(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub field_id: FieldId,
    #[serde(default)]
    pub field_type: FieldKind,
    #[serde(default)]
    pub name: String,
    #[serde(
        alias = "role",
        default,
        deserialize_with = "falsy_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub role_id: Option<RoleId>,
    pub page: u32,
    pub position_x: f32,
    pub position_y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub required: bool,
    #[serde(default, deserialize_with = "falsy_string")]
    pub value_text: Option<String>,
    #[serde(default, deserialize_with = "binary_payload")]
    pub value_binary: Option<String>,
    #[serde(default)]
    pub tabindex: i32,
    #[serde(default, deserialize_with = "falsy_string")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub to_sign: bool,
}

impl Item {
    pub fn clamp(&mut self) {
        self.position_x = clamp_percent(self.position_x);
        self.position_y = clamp_percent(self.position_y);
        self.width = clamp_percent(self.width);
        self.height = clamp_percent(self.height);
        self.page = self.page.max(1);
    }

    pub fn rect(&self) -> PercentRect {
        PercentRect {
            x: self.position_x,
            y: self.position_y,
            width: self.width,
            height: self.height,
        }
    }

    pub fn apply(&mut self, patch: &ItemPatch) {
        if let Some(field_id) = patch.field_id {
            self.field_id = field_id;
        }
        if let Some(role_id) = patch.role_id {
            self.role_id = Some(role_id);
        }
        if let Some(required) = patch.required {
            self.required = required;
        }
        if let Some(x) = patch.position_x {
            self.position_x = x;
        }
        if let Some(y) = patch.position_y {
            self.position_y = y;
        }
        if let Some(w) = patch.width {
            self.width = w;
        }
        if let Some(h) = patch.height {
            self.height = h;
        }
        self.clamp();
    }

    pub fn set_value(&mut self, value: &FieldValue) {
        match value {
            FieldValue::Text(text) => {
                self.value_text = (!text.is_empty()).then(|| text.clone());
            }
            FieldValue::Binary(data) => {
                self.value_binary = (!data.is_empty()).then(|| data.clone());
            }
        }
    }

    pub fn revert(&mut self, revert: &Revert) {
        match revert {
            Revert::Position { x, y } => {
                self.position_x = *x;
                self.position_y = *y;
            }
            Revert::Size { width, height } => {
                self.width = *width;
                self.height = *height;
            }
            Revert::Attributes {
                field_id,
                role_id,
                required,
                name,
                field_type,
                default_value,
            } => {
                self.field_id = *field_id;
                self.role_id = *role_id;
                self.required = *required;
                self.name = name.clone();
                self.field_type = *field_type;
                self.default_value = default_value.clone();
            }
            Revert::Text(text) => self.value_text = text.clone(),
            Revert::Binary(data) => self.value_binary = data.clone(),
        }
        self.clamp();
    }
}

/// Item ids in reading order: page, then top to bottom, then left to right.
pub fn reading_order<'a>(items: impl Iterator<Item = &'a Item>) -> Vec<ItemId> {
    let mut order: Vec<(u32, f32, f32, ItemId)> = items
        .map(|i| (i.page, i.position_y, i.position_x, i.id))
        .collect();
    order.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.total_cmp(&b.1))
            .then(a.2.total_cmp(&b.2))
            .then(a.3.cmp(&b.3))
    });
    order.into_iter().map(|(_, _, _, id)| id).collect()
}

/// The attributes a single backend call can change on an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldGroup {
    Position,
    Size,
    Attributes,
    Text,
    Binary,
}

/// Prior values of one [`FieldGroup`], enough to undo that group alone.
#[derive(Clone, Debug, PartialEq)]
pub enum Revert {
    Position {
        x: f32,
        y: f32,
    },
    Size {
        width: f32,
        height: f32,
    },
    Attributes {
        field_id: FieldId,
        role_id: Option<RoleId>,
        required: bool,
        name: String,
        field_type: FieldKind,
        default_value: Option<String>,
    },
    Text(Option<String>),
    Binary(Option<String>),
}

impl Revert {
    pub fn capture(item: &Item, group: FieldGroup) -> Self {
        match group {
            FieldGroup::Position => Revert::Position {
                x: item.position_x,
                y: item.position_y,
            },
            FieldGroup::Size => Revert::Size {
                width: item.width,
                height: item.height,
            },
            FieldGroup::Attributes => Revert::Attributes {
                field_id: item.field_id,
                role_id: item.role_id,
                required: item.required,
                name: item.name.clone(),
                field_type: item.field_type,
                default_value: item.default_value.clone(),
            },
            FieldGroup::Text => Revert::Text(item.value_text.clone()),
            FieldGroup::Binary => Revert::Binary(item.value_binary.clone()),
        }
    }

    pub fn group(&self) -> FieldGroup {
        match self {
            Revert::Position { .. } => FieldGroup::Position,
            Revert::Size { .. } => FieldGroup::Size,
            Revert::Attributes { .. } => FieldGroup::Attributes,
            Revert::Text(_) => FieldGroup::Text,
            Revert::Binary(_) => FieldGroup::Binary,
        }
    }
}

/// Partial item attributes accepted by `set_item_data`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_id: Option<FieldId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<RoleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
}

impl ItemPatch {
    pub fn position(at: Percent) -> Self {
        Self {
            position_x: Some(at.x),
            position_y: Some(at.y),
            ..Default::default()
        }
    }

    pub fn size(width: f32, height: f32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_binary: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Binary(String),
}

impl FieldValue {
    pub fn group(&self) -> FieldGroup {
        match self {
            FieldValue::Text(_) => FieldGroup::Text,
            FieldValue::Binary(_) => FieldGroup::Binary,
        }
    }

    pub fn to_values(&self) -> ItemValues {
        match self {
            FieldValue::Text(text) => ItemValues {
                value_text: Some(text.clone()),
                value_binary: None,
            },
            FieldValue::Binary(data) => ItemValues {
                value_text: None,
                value_binary: Some(data.clone()),
            },
        }
    }
}

/// Payload of `add_item`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NewItem {
    pub field_id: FieldId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<RoleId>,
    pub page: u32,
    pub position_x: f32,
    pub position_y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default, deserialize_with = "role_list")]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub partner: Partner,
    #[serde(default)]
    pub items: BTreeMap<ItemId, Item>,
    #[serde(default)]
    pub to_sign: bool,
}

impl DocumentInfo {
    pub fn field(&self, id: FieldId) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn role(&self, id: RoleId) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    pub fn default_for(&self, item: &Item) -> Option<&str> {
        let key = item.default_value.as_deref()?;
        self.partner.attribute(key)
    }
}

fn falsy_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Flag(bool),
    }
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

fn falsy_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Id(u64),
        Flag(bool),
    }
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Id(id)) => Some(id),
        _ => None,
    })
}

fn binary_payload<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = falsy_string(deserializer)?;
    Ok(raw.map(|s| match s.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data.to_string(),
        _ => s,
    }))
}

fn role_list<'de, D>(deserializer: D) -> Result<Vec<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seq(Vec<Role>),
        Map(BTreeMap<String, Role>),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Seq(roles) => roles,
        Raw::Map(map) => {
            let mut roles: Vec<Role> = map.into_values().collect();
            roles.sort_by_key(|r| r.id);
            roles
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_style_info() {
        let raw = r#"{
            "name": "NDA",
            "to_sign": true,
            "partner": {"id": 7, "name": "Ada", "email": "ada@example.com", "phone": false},
            "roles": {"10": {"id": 3, "name": "Customer", "role_id": 10, "partner_id": 7},
                      "2": {"id": 4, "name": "Employee", "role_id": 2, "partner_id": false}},
            "items": {"5": {
                "id": 5, "field_id": 1, "field_type": "text", "required": true,
                "name": "Email", "role": 10, "page": 1,
                "position_x": 10.0, "position_y": 20.0, "width": 20.0, "height": 1.5,
                "value_text": false, "value_binary": false, "default_value": "email",
                "tabindex": 1, "to_sign": true
            }}
        }"#;
        let info: DocumentInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.roles.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 10]);
        assert_eq!(info.roles[0].partner_id, None);
        let item = &info.items[&5];
        assert_eq!(item.role_id, Some(10));
        assert_eq!(item.value_text, None);
        assert_eq!(info.default_for(item), Some("ada@example.com"));
        assert_eq!(info.partner.attribute("phone"), None);
    }

    #[test]
    fn strips_data_url_prefix_from_binary() {
        let raw = r#"{"id": 1, "field_id": 2, "page": 1, "position_x": 0, "position_y": 0,
            "width": 10, "height": 5, "field_type": "signature",
            "value_binary": "data:image/png;base64,iVBORw0KGgo="}"#;
        let item: Item = serde_json::from_str(raw).unwrap();
        assert_eq!(item.value_binary.as_deref(), Some("iVBORw0KGgo="));
        assert_eq!(item.field_type, FieldKind::Signature);
    }

    #[test]
    fn unknown_field_type_is_tolerated() {
        let kind: FieldKind = serde_json::from_str("\"checkbox\"").unwrap();
        assert_eq!(kind, FieldKind::Unknown);
    }

    #[test]
    fn patch_serializes_only_changed_attributes() {
        let patch = ItemPatch::position(Percent::new(12.5, 40.0));
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"position_x": 12.5, "position_y": 40.0}));
    }

    #[test]
    fn apply_clamps_into_page() {
        let mut item: Item = serde_json::from_str(
            r#"{"id": 1, "field_id": 2, "page": 1, "position_x": 0, "position_y": 0, "width": 10, "height": 5}"#,
        )
        .unwrap();
        item.apply(&ItemPatch {
            position_x: Some(140.0),
            width: Some(-3.0),
            ..Default::default()
        });
        assert_eq!(item.position_x, 100.0);
        assert_eq!(item.width, 0.0);
    }
}
