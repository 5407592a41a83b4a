//! Action manifest parsing.
//!
//! The manifest is a human-authored JSON document listing logical actions and
//! their value class, consumed once at session-ready time to create runtime
//! actions and seed the binding engine:
//!
//! ```json
//! {
//!     "actions": [
//!         { "name": "/actions/default/in/Trigger", "type": "vector1" },
//!         { "name": "/actions/default/in/Joystick", "type": "vector2" },
//!         { "name": "/actions/default/out/Haptic", "type": "vibration" }
//!     ]
//! }
//! ```
//!
//! Long OpenVR-style names are translated to lowercase short names
//! (`/actions/default/in/Trigger` becomes `trigger`); lookups accept both.

use crate::runtime::{VrError, VrResult};
use serde::Deserialize;
use std::collections::HashMap;

/// Value class of a logical action. Each action has exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Scalar,
    Axis2,
    Boolean,
    Pose,
    Haptic,
}

impl ActionKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "vector1" | "scalar" => Some(ActionKind::Scalar),
            "vector2" => Some(ActionKind::Axis2),
            "boolean" => Some(ActionKind::Boolean),
            "pose" => Some(ActionKind::Pose),
            "vibration" | "haptic" => Some(ActionKind::Haptic),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActionKind::Scalar => "scalar",
            ActionKind::Axis2 => "vector2",
            ActionKind::Boolean => "boolean",
            ActionKind::Pose => "pose",
            ActionKind::Haptic => "vibration",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    actions: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

/// One parsed manifest entry.
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    /// Short lowercase name, e.g. `trigger`.
    pub name: String,
    /// The name as authored in the manifest.
    pub full_name: String,
    pub kind: ActionKind,
}

/// Parsed, validated action manifest.
#[derive(Debug, Clone, Default)]
pub struct ActionManifest {
    actions: Vec<ActionDescriptor>,
    index: HashMap<String, usize>,
}

impl ActionManifest {
    pub fn from_json(json: &str) -> VrResult<Self> {
        let raw: RawManifest = serde_json::from_str(json)
            .map_err(|err| VrError::InvalidManifest(err.to_string()))?;

        let mut actions = Vec::with_capacity(raw.actions.len());
        let mut index = HashMap::new();
        for entry in raw.actions {
            let kind = ActionKind::parse(&entry.kind).ok_or_else(|| {
                VrError::InvalidManifest(format!(
                    "action {} has unknown type {:?}",
                    entry.name, entry.kind
                ))
            })?;
            let short = translate_action_name(&entry.name);
            if short.is_empty() {
                return Err(VrError::InvalidManifest(format!(
                    "action name {:?} is empty after translation",
                    entry.name
                )));
            }
            if index.contains_key(&short) {
                return Err(VrError::InvalidManifest(format!(
                    "duplicate action name {short:?}"
                )));
            }
            index.insert(short.clone(), actions.len());
            actions.push(ActionDescriptor {
                name: short,
                full_name: entry.name,
                kind,
            });
        }

        Ok(Self { actions, index })
    }

    pub fn actions(&self) -> &[ActionDescriptor] {
        &self.actions
    }

    /// Look up by short or manifest-authored name.
    pub fn get(&self, name: &str) -> Option<&ActionDescriptor> {
        let short = translate_action_name(name);
        self.index.get(&short).map(|&i| &self.actions[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Strip an OpenVR-style `/actions/<set>/in/` or `/actions/<set>/out/`
/// prefix and lowercase the remainder. Names without the prefix are only
/// lowercased.
pub fn translate_action_name(name: &str) -> String {
    let trimmed = name
        .strip_prefix("/actions/")
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, after_set)| {
            after_set
                .strip_prefix("in/")
                .or_else(|| after_set.strip_prefix("out/"))
                .unwrap_or(after_set)
        })
        .unwrap_or(name);
    trimmed.to_ascii_lowercase()
}
