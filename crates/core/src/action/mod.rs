//! Structured side-effecting instructions derived from advisor output.

pub mod dispatch;
pub mod gate;
pub mod history;
pub mod normalize;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Every effect the dispatcher knows how to perform.
///
/// Model output spells these in many ways (`CREATE_TASK`, `create_task`,
/// `createTask`, `create-task`); all of them collapse into one variant here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionType {
    CreateTask,
    UpdateTask,
    DeleteTask,
    CreateHabit,
    ChangeTheme,
    UpdateProfile,
    DeleteFamilyMember,
    UpdateFamilyStatus,
    Navigate,
    ExportData,
    CreateDiaryEntry,
    UpdateSettings,
    /// Anything else the model produced, kept verbatim for the failure message.
    Unknown(String),
}

impl ActionType {
    pub const ALL: [ActionType; 12] = [
        ActionType::CreateTask,
        ActionType::UpdateTask,
        ActionType::DeleteTask,
        ActionType::CreateHabit,
        ActionType::ChangeTheme,
        ActionType::UpdateProfile,
        ActionType::DeleteFamilyMember,
        ActionType::UpdateFamilyStatus,
        ActionType::Navigate,
        ActionType::ExportData,
        ActionType::CreateDiaryEntry,
        ActionType::UpdateSettings,
    ];

    pub fn parse(raw: &str) -> Self {
        match canonical_key(raw).as_str() {
            "create_task" | "add_task" | "new_task" => Self::CreateTask,
            "update_task" | "edit_task" | "complete_task" => Self::UpdateTask,
            "delete_task" | "remove_task" => Self::DeleteTask,
            "create_habit" | "add_habit" | "new_habit" => Self::CreateHabit,
            "change_theme" | "set_theme" | "toggle_theme" => Self::ChangeTheme,
            "update_profile" | "edit_profile" => Self::UpdateProfile,
            "delete_family_member" | "remove_family_member" => Self::DeleteFamilyMember,
            "update_family_status" | "update_family_member_status" | "set_family_status" => {
                Self::UpdateFamilyStatus
            }
            "navigate" | "navigate_to" | "go_to" | "open_page" => Self::Navigate,
            "export_data" | "export" | "export_all_data" => Self::ExportData,
            "create_diary_entry" | "add_diary_entry" | "create_diary" | "new_diary_entry"
            | "create_journal_entry" => Self::CreateDiaryEntry,
            "update_settings" | "change_settings" => Self::UpdateSettings,
            _ => Self::Unknown(raw.trim().to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateTask => "CREATE_TASK",
            Self::UpdateTask => "UPDATE_TASK",
            Self::DeleteTask => "DELETE_TASK",
            Self::CreateHabit => "CREATE_HABIT",
            Self::ChangeTheme => "CHANGE_THEME",
            Self::UpdateProfile => "UPDATE_PROFILE",
            Self::DeleteFamilyMember => "DELETE_FAMILY_MEMBER",
            Self::UpdateFamilyStatus => "UPDATE_FAMILY_STATUS",
            Self::Navigate => "NAVIGATE",
            Self::ExportData => "EXPORT_DATA",
            Self::CreateDiaryEntry => "CREATE_DIARY_ENTRY",
            Self::UpdateSettings => "UPDATE_SETTINGS",
            Self::Unknown(raw) => raw.as_str(),
        }
    }
}

/// `createTask` / `CREATE-TASK` / `create task` → `create_task`.
fn canonical_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    let mut prev_lower = false;
    for c in raw.trim().chars() {
        if c == '-' || c == ' ' || c == '_' {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        } else if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActionType {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(Self::parse(&raw))
    }
}

/// One action proposed by the advisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAction {
    pub action_type: ActionType,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub confirmation_required: bool,
    #[serde(default)]
    pub confirmation_message: Option<String>,
}

impl AgentAction {
    pub fn new(action_type: ActionType, parameters: Map<String, Value>) -> Self {
        Self {
            action_type,
            parameters,
            confirmation_required: false,
            confirmation_message: None,
        }
    }

    pub fn requiring_confirmation(mut self, message: impl Into<String>) -> Self {
        self.confirmation_required = true;
        self.confirmation_message = Some(message.into());
        self
    }

    /// Read an action out of an already-parsed model payload.
    ///
    /// Accepts the nested form `{"type":"action","action":{"actionType":..}}`
    /// and the flat form `{"type":"action","actionType":..,"parameters":..}`.
    /// The inner type key may be `actionType`, `action_type` or `type`.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let body = match payload.get("action") {
            Some(inner @ Value::Object(_)) => inner,
            _ => payload,
        };
        let type_str = ["actionType", "action_type"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_str))
            .or_else(|| {
                // In the nested form `type` belongs to the action itself.
                if std::ptr::eq(body, payload) {
                    None
                } else {
                    body.get("type").and_then(Value::as_str)
                }
            })
            .or_else(|| payload.get("action").and_then(Value::as_str))?;

        let parameters = ["parameters", "params", "data"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_object))
            .cloned()
            .unwrap_or_default();

        let confirmation_required = ["confirmationRequired", "confirmation_required", "requiresConfirmation"]
            .iter()
            .find_map(|k| body.get(*k).or_else(|| payload.get(*k)).and_then(Value::as_bool))
            .unwrap_or(false);

        let confirmation_message = ["confirmationMessage", "confirmation_message"]
            .iter()
            .find_map(|k| body.get(*k).or_else(|| payload.get(*k)).and_then(Value::as_str))
            .map(str::to_owned);

        Some(Self {
            action_type: ActionType::parse(type_str),
            parameters,
            confirmation_required,
            confirmation_message,
        })
    }

    /// Text shown while the action waits on the confirmation gate.
    pub fn confirmation_prompt(&self) -> String {
        self.confirmation_message
            .clone()
            .unwrap_or_else(|| format!("Do you want me to run {}?", self.action_type))
    }
}

/// An action plus the conversational text the model attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub action: AgentAction,
    pub message: Option<String>,
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), data: None, error: None }
    }

    pub fn ok_with(message: impl Into<String>, data: Value) -> Self {
        Self { success: true, message: message.into(), data: Some(data), error: None }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), data: None, error: None }
    }

    pub fn failure_with(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: Some(error.into()),
        }
    }
}
