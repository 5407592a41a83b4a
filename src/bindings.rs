//! Interaction binding tables and the per-profile suggestion engine.
//!
//! A small set of semantic action names is reconciled against vendor
//! interaction profiles: for every supported profile the engine filters the
//! binding table down to paths that profile actually exposes, expands the
//! hand wildcard, and emits one suggestion set per profile. Profiles are
//! independent; a path meaningless for a profile is omitted, never an error.
//!
//! The tables are immutable configuration: built-in defaults plus optional
//! host overrides appended at construction, never mutated afterwards, so
//! reads need no locking.

use crate::manifest::ActionManifest;
use crate::runtime::Hand;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// A (path pattern, semantic action name) pair. The pattern may contain a
/// `*` hand segment meaning "left or right".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionBinding {
    pub path: String,
    pub action: String,
}

impl InteractionBinding {
    pub fn new(path: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: action.into(),
        }
    }
}

/// Vendor-generic defaults. Later entries override earlier ones for the same
/// concrete path, so per-title overrides layer cleanly after these.
const DEFAULT_BINDINGS: &[(&str, &str)] = &[
    ("/user/hand/*/input/aim/pose", "pose"),
    ("/user/hand/*/input/trigger", "trigger"),
    ("/user/hand/*/input/squeeze", "grip"),
    ("/user/hand/*/input/x/click", "abutton"),
    ("/user/hand/*/input/y/click", "bbutton"),
    ("/user/hand/*/input/a/click", "abutton"),
    ("/user/hand/*/input/b/click", "bbutton"),
    ("/user/hand/*/input/thumbstick", "joystick"),
    ("/user/hand/*/input/thumbstick/click", "joystickclick"),
    ("/user/hand/*/input/system/click", "systembutton"),
    ("/user/hand/*/input/trackpad", "joystick"),
    ("/user/hand/*/input/trackpad/click", "joystickclick"),
    ("/user/hand/*/output/haptic", "haptic"),
];

pub const SUPPORTED_PROFILES: &[&str] = &[
    "/interaction_profiles/khr/simple_controller",
    "/interaction_profiles/oculus/touch_controller",
    "/interaction_profiles/oculus/go_controller",
    "/interaction_profiles/valve/index_controller",
    "/interaction_profiles/microsoft/motion_controller",
    "/interaction_profiles/htc/vive_controller",
];

struct ProfilePaths {
    both: &'static [&'static str],
    left: &'static [&'static str],
    right: &'static [&'static str],
}

/// Input/output components each profile exposes, as path suffixes relative
/// to `/user/hand/<side>`.
static PROFILE_PATHS: Lazy<HashMap<&'static str, ProfilePaths>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(
        "/interaction_profiles/khr/simple_controller",
        ProfilePaths {
            both: &[
                "input/select/click",
                "input/menu/click",
                "input/grip/pose",
                "input/aim/pose",
                "output/haptic",
            ],
            left: &[],
            right: &[],
        },
    );
    map.insert(
        "/interaction_profiles/oculus/touch_controller",
        ProfilePaths {
            both: &[
                "input/squeeze/value",
                "input/trigger/value",
                "input/trigger/touch",
                "input/thumbstick/x",
                "input/thumbstick/y",
                "input/thumbstick/click",
                "input/thumbstick/touch",
                "input/aim/pose",
                "input/grip/pose",
                "output/haptic",
            ],
            left: &[
                "input/x/click",
                "input/x/touch",
                "input/y/click",
                "input/y/touch",
                "input/menu/click",
            ],
            right: &[
                "input/a/click",
                "input/a/touch",
                "input/b/click",
                "input/b/touch",
                "input/system/click",
            ],
        },
    );
    map.insert(
        "/interaction_profiles/oculus/go_controller",
        ProfilePaths {
            both: &[
                "input/system/click",
                "input/trigger/click",
                "input/back/click",
                "input/trackpad/x",
                "input/trackpad/y",
                "input/trackpad/click",
                "input/trackpad/touch",
                "input/aim/pose",
                "input/grip/pose",
            ],
            left: &[],
            right: &[],
        },
    );
    map.insert(
        "/interaction_profiles/valve/index_controller",
        ProfilePaths {
            both: &[
                "input/system/click",
                "input/system/touch",
                "input/a/click",
                "input/a/touch",
                "input/b/click",
                "input/b/touch",
                "input/squeeze/value",
                "input/squeeze/force",
                "input/trigger/click",
                "input/trigger/value",
                "input/trigger/touch",
                "input/thumbstick/x",
                "input/thumbstick/y",
                "input/thumbstick/click",
                "input/thumbstick/touch",
                "input/trackpad/x",
                "input/trackpad/y",
                "input/trackpad/force",
                "input/trackpad/touch",
                "input/aim/pose",
                "input/grip/pose",
                "output/haptic",
            ],
            left: &[],
            right: &[],
        },
    );
    map.insert(
        "/interaction_profiles/microsoft/motion_controller",
        ProfilePaths {
            both: &[
                "input/menu/click",
                "input/squeeze/click",
                "input/trigger/value",
                "input/thumbstick/x",
                "input/thumbstick/y",
                "input/thumbstick/click",
                "input/trackpad/x",
                "input/trackpad/y",
                "input/trackpad/click",
                "input/trackpad/touch",
                "input/aim/pose",
                "input/grip/pose",
                "output/haptic",
            ],
            left: &[],
            right: &[],
        },
    );
    map.insert(
        "/interaction_profiles/htc/vive_controller",
        ProfilePaths {
            both: &[
                "input/system/click",
                "input/squeeze/click",
                "input/menu/click",
                "input/trigger/click",
                "input/trigger/value",
                "input/trackpad/x",
                "input/trackpad/y",
                "input/trackpad/click",
                "input/trackpad/touch",
                "input/aim/pose",
                "input/grip/pose",
                "output/haptic",
            ],
            left: &[],
            right: &[],
        },
    );
    map
});

/// Whether `profile` exposes the concrete binding path. Binding paths may
/// name a parent of an exposed component (`input/trigger` is valid when the
/// profile exposes `input/trigger/value`).
pub fn profile_exposes(profile: &str, hand: Hand, suffix: &str) -> bool {
    let Some(paths) = PROFILE_PATHS.get(profile) else {
        return false;
    };
    let side = match hand {
        Hand::Left => paths.left,
        Hand::Right => paths.right,
    };
    paths
        .both
        .iter()
        .chain(side.iter())
        .any(|component| *component == suffix || component.starts_with(&format!("{suffix}/")))
}

/// One entry of a per-profile suggestion set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSuggestion {
    pub action: String,
    pub hand: Hand,
    /// Concrete path with the wildcard resolved, e.g.
    /// `/user/hand/left/input/trigger`.
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct ProfileSuggestions {
    pub profile: String,
    pub bindings: Vec<BindingSuggestion>,
}

/// The immutable binding table: vendor-generic defaults plus optional host
/// overrides appended after them.
#[derive(Debug, Clone)]
pub struct BindingTable {
    entries: Vec<InteractionBinding>,
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::with_overrides(std::iter::empty())
    }
}

impl BindingTable {
    pub fn with_overrides(overrides: impl IntoIterator<Item = InteractionBinding>) -> Self {
        let mut entries: Vec<InteractionBinding> = DEFAULT_BINDINGS
            .iter()
            .map(|(path, action)| InteractionBinding::new(*path, *action))
            .collect();
        entries.extend(overrides);
        Self { entries }
    }

    pub fn entries(&self) -> &[InteractionBinding] {
        &self.entries
    }

    /// Suggestion sets for every supported profile, in table order.
    pub fn suggestions(&self, manifest: &ActionManifest) -> Vec<ProfileSuggestions> {
        SUPPORTED_PROFILES
            .iter()
            .map(|profile| ProfileSuggestions {
                profile: (*profile).to_string(),
                bindings: self.suggestions_for_profile(manifest, profile),
            })
            .collect()
    }

    /// The filtered suggestion set for one profile: only paths the profile
    /// exposes, only actions present in the manifest, hand wildcard expanded.
    ///
    /// Conflict resolution per concrete path: a specific-hand entry beats a
    /// wildcard entry regardless of table order; between entries of equal
    /// specificity the later one wins, so overrides layered after the
    /// defaults take effect.
    pub fn suggestions_for_profile(
        &self,
        manifest: &ActionManifest,
        profile: &str,
    ) -> Vec<BindingSuggestion> {
        // (suggestion, specificity); the table is small, linear scan is fine.
        let mut chosen: Vec<(BindingSuggestion, u8)> = Vec::new();

        for entry in &self.entries {
            let Some(pattern) = HandPattern::parse(&entry.path) else {
                log::warn!(
                    "[bindings] ignoring malformed binding path {:?}",
                    entry.path
                );
                continue;
            };
            let Some(action) = manifest.get(&entry.action) else {
                continue;
            };

            for hand in pattern.hands() {
                if !profile_exposes(profile, hand, pattern.suffix) {
                    continue;
                }
                let concrete = format!("{}/{}", hand.user_path(), pattern.suffix);
                let specificity = if pattern.wildcard { 0 } else { 1 };
                let suggestion = BindingSuggestion {
                    action: action.name.clone(),
                    hand,
                    path: concrete,
                };
                match chosen.iter_mut().find(|(existing, _)| {
                    existing.path == suggestion.path
                }) {
                    Some((existing, existing_specificity)) => {
                        if specificity >= *existing_specificity {
                            *existing = suggestion;
                            *existing_specificity = specificity;
                        }
                    }
                    None => chosen.push((suggestion, specificity)),
                }
            }
        }

        chosen.into_iter().map(|(suggestion, _)| suggestion).collect()
    }
}

struct HandPattern<'a> {
    wildcard: bool,
    hands: [Option<Hand>; 2],
    suffix: &'a str,
}

impl<'a> HandPattern<'a> {
    fn parse(path: &'a str) -> Option<Self> {
        let rest = path.strip_prefix("/user/hand/")?;
        let (segment, suffix) = rest.split_once('/')?;
        if suffix.is_empty() {
            return None;
        }
        match segment {
            "*" => Some(Self {
                wildcard: true,
                hands: [Some(Hand::Left), Some(Hand::Right)],
                suffix,
            }),
            "left" => Some(Self {
                wildcard: false,
                hands: [Some(Hand::Left), None],
                suffix,
            }),
            "right" => Some(Self {
                wildcard: false,
                hands: [Some(Hand::Right), None],
                suffix,
            }),
            _ => None,
        }
    }

    fn hands(&self) -> impl Iterator<Item = Hand> + '_ {
        self.hands.iter().flatten().copied()
    }
}
