//! Global shortcut bindings.
//!
//! Accelerators are `+`-joined strings such as `Alt+S` or `Ctrl+Shift+Enter`.
//! Every binding is stored in canonical form (modifiers ordered Ctrl, Alt,
//! Shift, Super; single-character keys upper-cased) so lookups are plain
//! string comparisons.

use crate::app::ShellEvent;
use crate::settings::{SettingsError, SettingsStore, KEY_SHORTCUTS};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShortcutAction {
    Capture,
    Toggle,
    BatchCapture,
    BatchSend,
    BatchClear,
}

impl ShortcutAction {
    pub const ALL: [ShortcutAction; 5] = [
        ShortcutAction::Capture,
        ShortcutAction::Toggle,
        ShortcutAction::BatchCapture,
        ShortcutAction::BatchSend,
        ShortcutAction::BatchClear,
    ];

    /// Name used in the persisted JSON map.
    pub fn name(self) -> &'static str {
        match self {
            ShortcutAction::Capture => "capture",
            ShortcutAction::Toggle => "toggle",
            ShortcutAction::BatchCapture => "batchCapture",
            ShortcutAction::BatchSend => "batchSend",
            ShortcutAction::BatchClear => "batchClear",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    pub fn default_accelerator(self) -> &'static str {
        match self {
            ShortcutAction::Capture => "Alt+S",
            ShortcutAction::Toggle => "Alt+H",
            ShortcutAction::BatchCapture => "Alt+B",
            ShortcutAction::BatchSend => "Alt+Enter",
            ShortcutAction::BatchClear => "Alt+Backspace",
        }
    }

    pub fn event(self) -> ShellEvent {
        match self {
            ShortcutAction::Capture => ShellEvent::Capture,
            ShortcutAction::Toggle => ShellEvent::ToggleVisibility,
            ShortcutAction::BatchCapture => ShellEvent::BatchCapture,
            ShortcutAction::BatchSend => ShellEvent::BatchSend,
            ShortcutAction::BatchClear => ShellEvent::BatchClear,
        }
    }
}

impl fmt::Display for ShortcutAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShortcutError {
    #[error("Shortcut is empty")]
    Empty,

    #[error("Shortcut '{0}' needs at least one modifier (Ctrl, Alt, Shift or Super)")]
    NoModifier(String),

    #[error("Shortcut '{0}' has no key")]
    NoKey(String),

    #[error("Shortcut '{0}' has more than one key")]
    MultipleKeys(String),

    #[error("Shortcut '{accelerator}' uses unknown key '{key}'")]
    UnknownKey { accelerator: String, key: String },

    #[error("'{accelerator}' is bound to both {first} and {second}")]
    Duplicate {
        accelerator: String,
        first: ShortcutAction,
        second: ShortcutAction,
    },

    #[error("Unknown shortcut action '{0}'")]
    UnknownAction(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Could not encode shortcuts: {0}")]
    Encode(String),
}

const MODIFIER_ORDER: [&str; 4] = ["Ctrl", "Alt", "Shift", "Super"];

const NAMED_KEYS: &[&str] = &[
    "Enter", "Backspace", "Space", "Tab", "Escape", "Delete", "Insert", "Home", "End",
    "PageUp", "PageDown", "Up", "Down", "Left", "Right",
];

fn modifier(token: &str) -> Option<&'static str> {
    match token.to_ascii_lowercase().as_str() {
        "ctrl" | "control" | "cmdorctrl" | "commandorcontrol" => Some("Ctrl"),
        "alt" | "option" => Some("Alt"),
        "shift" => Some("Shift"),
        "super" | "cmd" | "command" | "meta" | "win" => Some("Super"),
        _ => None,
    }
}

fn key(token: &str) -> Option<String> {
    let mut chars = token.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return c.is_ascii_graphic().then(|| c.to_ascii_uppercase().to_string());
    }
    let lower = token.to_ascii_lowercase();
    if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
        return (1..=24).contains(&n).then(|| format!("F{}", n));
    }
    let alias = match lower.as_str() {
        "return" => "enter",
        "esc" => "escape",
        "del" => "delete",
        other => other,
    };
    NAMED_KEYS
        .iter()
        .find(|k| k.to_ascii_lowercase() == alias)
        .map(|k| k.to_string())
}

/// Validates an accelerator and returns its canonical spelling.
pub fn canonicalize(accelerator: &str) -> Result<String, ShortcutError> {
    let trimmed = accelerator.trim();
    if trimmed.is_empty() {
        return Err(ShortcutError::Empty);
    }

    let mut modifiers: Vec<&'static str> = Vec::new();
    let mut keys: Vec<String> = Vec::new();
    for token in trimmed.split('+').map(str::trim) {
        if token.is_empty() {
            return Err(ShortcutError::NoKey(trimmed.to_string()));
        }
        if let Some(m) = modifier(token) {
            if !modifiers.contains(&m) {
                modifiers.push(m);
            }
            continue;
        }
        match key(token) {
            Some(k) => keys.push(k),
            None => {
                return Err(ShortcutError::UnknownKey {
                    accelerator: trimmed.to_string(),
                    key: token.to_string(),
                })
            }
        }
    }

    if modifiers.is_empty() {
        return Err(ShortcutError::NoModifier(trimmed.to_string()));
    }
    let key = match keys.len() {
        0 => return Err(ShortcutError::NoKey(trimmed.to_string())),
        1 => keys.remove(0),
        _ => return Err(ShortcutError::MultipleKeys(trimmed.to_string())),
    };

    let mut parts: Vec<&str> = MODIFIER_ORDER
        .iter()
        .copied()
        .filter(|m| modifiers.contains(m))
        .collect();
    parts.push(&key);
    Ok(parts.join("+"))
}

/// Action → canonical accelerator. Always has a binding for every action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutMap {
    bindings: BTreeMap<ShortcutAction, String>,
}

impl Default for ShortcutMap {
    fn default() -> Self {
        Self {
            bindings: ShortcutAction::ALL
                .into_iter()
                .map(|a| (a, a.default_accelerator().to_string()))
                .collect(),
        }
    }
}

impl ShortcutMap {
    /// Builds a map from `(action name, accelerator)` pairs. Actions not
    /// listed keep their defaults.
    pub fn from_named<'a, I>(pairs: I) -> Result<Self, ShortcutError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut map = Self::default();
        for (name, accelerator) in pairs {
            let action = ShortcutAction::from_name(name)
                .ok_or_else(|| ShortcutError::UnknownAction(name.to_string()))?;
            map.bindings.insert(action, canonicalize(accelerator)?);
        }
        map.check_duplicates()?;
        Ok(map)
    }

    pub fn get(&self, action: ShortcutAction) -> &str {
        self.bindings
            .get(&action)
            .map(String::as_str)
            .unwrap_or_else(|| action.default_accelerator())
    }

    /// Rebinds one action. The map is left unchanged on error.
    pub fn set(&mut self, action: ShortcutAction, accelerator: &str) -> Result<(), ShortcutError> {
        let canonical = canonicalize(accelerator)?;
        if let Some((&other, _)) = self
            .bindings
            .iter()
            .find(|(a, bound)| **a != action && **bound == canonical)
        {
            return Err(ShortcutError::Duplicate {
                accelerator: canonical,
                first: other,
                second: action,
            });
        }
        self.bindings.insert(action, canonical);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ShortcutAction, &str)> {
        self.bindings.iter().map(|(a, s)| (*a, s.as_str()))
    }

    /// Maps a pressed accelerator to the event it triggers.
    pub fn resolve(&self, accelerator: &str) -> Option<ShellEvent> {
        let canonical = canonicalize(accelerator).ok()?;
        self.iter()
            .find(|(_, bound)| *bound == canonical)
            .map(|(action, _)| action.event())
    }

    fn check_duplicates(&self) -> Result<(), ShortcutError> {
        let mut seen: HashMap<&str, ShortcutAction> = HashMap::new();
        for (action, accelerator) in self.iter() {
            if let Some(first) = seen.insert(accelerator, action) {
                return Err(ShortcutError::Duplicate {
                    accelerator: accelerator.to_string(),
                    first,
                    second: action,
                });
            }
        }
        Ok(())
    }

    /// Reads the stored map, falling back to defaults if it is missing or bad.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let raw = match store.get(KEY_SHORTCUTS) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::default(),
            Err(e) => {
                log::warn!("[SETTINGS] Could not read shortcuts, using defaults: {}", e);
                return Self::default();
            }
        };
        let parsed: HashMap<String, String> = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("[SETTINGS] Stored shortcuts are not valid JSON, using defaults: {}", e);
                return Self::default();
            }
        };
        match Self::from_named(parsed.iter().map(|(k, v)| (k.as_str(), v.as_str()))) {
            Ok(map) => map,
            Err(e) => {
                log::warn!("[SETTINGS] Stored shortcuts rejected, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, store: &dyn SettingsStore) -> Result<(), ShortcutError> {
        let named: BTreeMap<&str, &str> = self.iter().map(|(a, s)| (a.name(), s)).collect();
        let json = serde_json::to_string(&named).map_err(|e| ShortcutError::Encode(e.to_string()))?;
        store.set(KEY_SHORTCUTS, &json)?;
        log::info!("[SETTINGS] Saved {} shortcuts", named.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemoryStore;

    #[test]
    fn canonical_form_orders_modifiers_and_uppercases_keys() {
        assert_eq!(canonicalize("shift+ctrl+s").unwrap(), "Ctrl+Shift+S");
        assert_eq!(canonicalize(" Cmd + Option + return ").unwrap(), "Alt+Super+Enter");
        assert_eq!(canonicalize("Alt+f5").unwrap(), "Alt+F5");
        assert_eq!(canonicalize("Alt+Alt+x").unwrap(), "Alt+X");
    }

    #[test]
    fn rejects_malformed_accelerators() {
        assert!(matches!(canonicalize(""), Err(ShortcutError::Empty)));
        assert!(matches!(canonicalize("S"), Err(ShortcutError::NoModifier(_))));
        assert!(matches!(canonicalize("Alt+Shift"), Err(ShortcutError::NoKey(_))));
        assert!(matches!(canonicalize("Alt+S+D"), Err(ShortcutError::MultipleKeys(_))));
        assert!(matches!(canonicalize("Alt+"), Err(ShortcutError::NoKey(_))));
        assert!(matches!(canonicalize("Alt+Hyper"), Err(ShortcutError::UnknownKey { .. })));
        assert!(matches!(canonicalize("Alt+F30"), Err(ShortcutError::UnknownKey { .. })));
    }

    #[test]
    fn defaults_resolve_to_events() {
        let map = ShortcutMap::default();
        assert_eq!(map.resolve("alt+s"), Some(ShellEvent::Capture));
        assert_eq!(map.resolve("Alt+H"), Some(ShellEvent::ToggleVisibility));
        assert_eq!(map.resolve("Alt+Enter"), Some(ShellEvent::BatchSend));
        assert_eq!(map.resolve("Ctrl+S"), None);
        assert_eq!(map.resolve("nonsense"), None);
    }

    #[test]
    fn set_rejects_duplicates_and_keeps_old_binding() {
        let mut map = ShortcutMap::default();
        let err = map.set(ShortcutAction::Toggle, "alt+s").unwrap_err();
        assert!(matches!(
            err,
            ShortcutError::Duplicate { first: ShortcutAction::Capture, second: ShortcutAction::Toggle, .. }
        ));
        assert_eq!(map.get(ShortcutAction::Toggle), "Alt+H");

        map.set(ShortcutAction::Toggle, "ctrl+shift+h").unwrap();
        assert_eq!(map.resolve("Shift+Ctrl+H"), Some(ShellEvent::ToggleVisibility));
    }

    #[test]
    fn from_named_detects_collisions_with_defaults() {
        let err = ShortcutMap::from_named([("batchCapture", "Alt+S")]).unwrap_err();
        assert!(matches!(err, ShortcutError::Duplicate { .. }));
        assert!(matches!(
            ShortcutMap::from_named([("zoom", "Alt+Z")]),
            Err(ShortcutError::UnknownAction(_))
        ));
    }

    #[test]
    fn save_then_load_restores_bindings() {
        let store = MemoryStore::new();
        let mut map = ShortcutMap::default();
        map.set(ShortcutAction::Capture, "Ctrl+Alt+1").unwrap();
        map.save(&store).unwrap();

        let loaded = ShortcutMap::load(&store);
        assert_eq!(loaded.get(ShortcutAction::Capture), "Ctrl+Alt+1");
        assert_eq!(loaded, map);
    }

    #[test]
    fn bad_stored_map_falls_back_to_defaults() {
        let store = MemoryStore::new().with(KEY_SHORTCUTS, "{\"capture\":\"S\"}");
        assert_eq!(ShortcutMap::load(&store), ShortcutMap::default());

        let store = MemoryStore::new().with(KEY_SHORTCUTS, "not json");
        assert_eq!(ShortcutMap::load(&store), ShortcutMap::default());
    }
}
