//! Voice command catalogue and accessibility usage tracking.
//!
//! Usage reports and detected device capabilities are written to the audit log
//! as `accessibility_usage` events with a JSON payload.

use log::{debug, info};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;

use crate::audit::AuditSink;
use crate::database::models::{AuditEventType, VisualImpairmentLevel};

/// Group a voice command belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    Navigation,
    Reading,
    Visual,
    Interaction,
}

impl CommandCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandCategory::Navigation => "navigation",
            CommandCategory::Reading => "reading",
            CommandCategory::Visual => "visual",
            CommandCategory::Interaction => "interaction",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "navigation" => Ok(CommandCategory::Navigation),
            "reading" => Ok(CommandCategory::Reading),
            "visual" => Ok(CommandCategory::Visual),
            "interaction" => Ok(CommandCategory::Interaction),
            _ => Err(format!("Invalid command category: {}", s)),
        }
    }
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Users a voice command is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAudience {
    All,
    Blind,
    LowVision,
}

impl CommandAudience {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandAudience::All => "all",
            CommandAudience::Blind => "blind",
            CommandAudience::LowVision => "low_vision",
        }
    }

    /// Whether a user with this impairment level is offered the command
    pub fn includes(&self, level: VisualImpairmentLevel) -> bool {
        match self {
            CommandAudience::All => true,
            CommandAudience::Blind => level == VisualImpairmentLevel::Blind,
            CommandAudience::LowVision => level == VisualImpairmentLevel::LowVision,
        }
    }
}

/// A supported spoken command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceCommand {
    pub command: &'static str,
    pub description: &'static str,
    pub examples: &'static [&'static str],
    pub category: CommandCategory,
    pub audience: CommandAudience,
}

/// Spoken commands understood by the clients; phrases are in Spanish, the default language
pub const VOICE_COMMANDS: [VoiceCommand; 6] = [
    VoiceCommand {
        command: "navegar al inicio",
        description: "Go to the home page",
        examples: &["ir al inicio", "página principal", "home"],
        category: CommandCategory::Navigation,
        audience: CommandAudience::All,
    },
    VoiceCommand {
        command: "leer contenido",
        description: "Read the current screen aloud",
        examples: &["leer página", "qué dice aquí", "leer todo"],
        category: CommandCategory::Reading,
        audience: CommandAudience::Blind,
    },
    VoiceCommand {
        command: "aumentar contraste",
        description: "Turn on high contrast mode",
        examples: &["alto contraste", "más contraste", "contraste"],
        category: CommandCategory::Visual,
        audience: CommandAudience::LowVision,
    },
    VoiceCommand {
        command: "activar modo oscuro",
        description: "Switch to dark mode",
        examples: &["modo oscuro", "tema oscuro", "dark mode"],
        category: CommandCategory::Visual,
        audience: CommandAudience::All,
    },
    VoiceCommand {
        command: "aumentar tamaño de texto",
        description: "Increase the font size",
        examples: &["texto más grande", "agrandar letras"],
        category: CommandCategory::Visual,
        audience: CommandAudience::LowVision,
    },
    VoiceCommand {
        command: "activar asistente de voz",
        description: "Turn on voice commands",
        examples: &["activar voz", "comandos de voz"],
        category: CommandCategory::Interaction,
        audience: CommandAudience::All,
    },
];

/// Commands offered to a user, optionally narrowed to one category
pub fn voice_commands(
    level: Option<VisualImpairmentLevel>,
    category: Option<CommandCategory>,
) -> Vec<&'static VoiceCommand> {
    VOICE_COMMANDS
        .iter()
        .filter(|cmd| level.map_or(true, |level| cmd.audience.includes(level)))
        .filter(|cmd| category.map_or(true, |category| cmd.category == category))
        .collect()
}

/// Commands grouped by category, in catalogue order
pub fn group_by_category(commands: &[&'static VoiceCommand]) -> Vec<(CommandCategory, Vec<&'static VoiceCommand>)> {
    let mut groups: Vec<(CommandCategory, Vec<&'static VoiceCommand>)> = Vec::new();
    for cmd in commands {
        match groups.iter_mut().find(|(category, _)| *category == cmd.category) {
            Some((_, group)) => group.push(cmd),
            None => groups.push((cmd.category, vec![cmd])),
        }
    }
    groups
}

/// Kind of accessibility usage a client reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessibilityEventType {
    PreferenceChanged,
    ErrorEncountered,
    FeatureUsed,
    TtsUsed,
    VoiceCommandUsed,
    NavigationError,
}

impl AccessibilityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessibilityEventType::PreferenceChanged => "preference_changed",
            AccessibilityEventType::ErrorEncountered => "error_encountered",
            AccessibilityEventType::FeatureUsed => "feature_used",
            AccessibilityEventType::TtsUsed => "tts_used",
            AccessibilityEventType::VoiceCommandUsed => "voice_command_used",
            AccessibilityEventType::NavigationError => "navigation_error",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "preference_changed" => Ok(AccessibilityEventType::PreferenceChanged),
            "error_encountered" => Ok(AccessibilityEventType::ErrorEncountered),
            "feature_used" => Ok(AccessibilityEventType::FeatureUsed),
            "tts_used" => Ok(AccessibilityEventType::TtsUsed),
            "voice_command_used" => Ok(AccessibilityEventType::VoiceCommandUsed),
            "navigation_error" => Ok(AccessibilityEventType::NavigationError),
            _ => Err(format!("Invalid accessibility event type: {}", s)),
        }
    }
}

/// One usage report from a client
#[derive(Debug, Clone)]
pub struct UsageReport {
    pub event_type: AccessibilityEventType,
    /// Name of the feature that was used, such as `tts` or `high_contrast`
    pub feature: String,
    pub details: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenSize {
    Small,
    Medium,
    Large,
}

impl ScreenSize {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "small" => Ok(ScreenSize::Small),
            "medium" => Ok(ScreenSize::Medium),
            "large" => Ok(ScreenSize::Large),
            _ => Err(format!("Invalid screen size: {}", s)),
        }
    }
}

/// What a client detected about the device it runs on
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceCapabilities {
    pub has_screen_reader: bool,
    pub supports_haptic: bool,
    pub supports_voice_input: bool,
    pub supports_tts: bool,
    pub screen_size: Option<ScreenSize>,
}

impl DeviceCapabilities {
    /// Settings worth turning on for this device
    pub fn suggestions(&self) -> Vec<String> {
        let mut suggestions = Vec::new();
        if self.has_screen_reader {
            suggestions.push("A screen reader was detected. Consider turning on screen reader mode.".to_string());
        }
        if self.supports_voice_input {
            suggestions.push("This device supports voice input. You can turn on voice commands.".to_string());
        }
        if self.supports_haptic {
            suggestions.push("This device can vibrate. Haptic feedback is available.".to_string());
        }
        if self.screen_size == Some(ScreenSize::Small) {
            suggestions.push("Small screen detected. Consider a larger font size.".to_string());
        }
        suggestions
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccessibilityError {
    #[error("The name of the feature used is required")]
    MissingFeature,
}

/// Records accessibility usage for later review of which aids people rely on
pub struct UsageTracker {
    audit: Arc<dyn AuditSink>,
}

impl UsageTracker {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }

    pub fn log_usage(&self, user_id: &str, report: &UsageReport) -> Result<(), AccessibilityError> {
        let feature = report.feature.trim();
        if feature.is_empty() {
            return Err(AccessibilityError::MissingFeature);
        }

        let details = json!({
            "event_type": report.event_type.as_str(),
            "feature": feature,
            "success": report.success,
            "details": report.details,
        });
        self.audit
            .record(AuditEventType::AccessibilityUsage, Some(user_id), Some(&details.to_string()));

        debug!("Accessibility usage for user {}: {} {}", user_id, report.event_type.as_str(), feature);
        Ok(())
    }

    /// Record what the device supports and return matching setting suggestions
    pub fn record_capabilities(&self, user_id: &str, capabilities: &DeviceCapabilities) -> Vec<String> {
        let details = json!({
            "event_type": AccessibilityEventType::FeatureUsed.as_str(),
            "feature": "device_capabilities",
            "capabilities": capabilities,
        });
        self.audit
            .record(AuditEventType::AccessibilityUsage, Some(user_id), Some(&details.to_string()));

        let suggestions = capabilities.suggestions();
        info!("Device capabilities recorded for user {}: {} suggestions", user_id, suggestions.len());
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::testing::RecordingSink;
    use test_case::test_case;

    #[test_case(None, None, 6 ; "whole catalogue")]
    #[test_case(Some(VisualImpairmentLevel::Blind), None, 4 ; "blind users")]
    #[test_case(Some(VisualImpairmentLevel::LowVision), None, 5 ; "low vision users")]
    #[test_case(Some(VisualImpairmentLevel::None), None, 3 ; "commands for everyone")]
    #[test_case(None, Some(CommandCategory::Visual), 3 ; "visual category")]
    #[test_case(Some(VisualImpairmentLevel::Blind), Some(CommandCategory::Visual), 1 ; "blind and visual")]
    fn test_voice_command_filters(
        level: Option<VisualImpairmentLevel>,
        category: Option<CommandCategory>,
        expected: usize,
    ) {
        assert_eq!(voice_commands(level, category).len(), expected);
    }

    #[test]
    fn test_group_by_category_keeps_catalogue_order() {
        let groups = group_by_category(&voice_commands(None, None));

        let categories: Vec<_> = groups.iter().map(|(category, _)| *category).collect();
        assert_eq!(categories, vec![
            CommandCategory::Navigation,
            CommandCategory::Reading,
            CommandCategory::Visual,
            CommandCategory::Interaction,
        ]);
        assert_eq!(groups[2].1.len(), 3);
    }

    #[test]
    fn test_event_type_parsing() {
        assert_eq!(AccessibilityEventType::from_str("tts-used").unwrap(), AccessibilityEventType::TtsUsed);
        assert_eq!(
            AccessibilityEventType::from_str("VOICE_COMMAND_USED").unwrap(),
            AccessibilityEventType::VoiceCommandUsed
        );
        assert!(AccessibilityEventType::from_str("clicked").is_err());
    }

    #[test]
    fn test_log_usage_records_audit_event() {
        let audit = Arc::new(RecordingSink::default());
        let tracker = UsageTracker::new(audit.clone());

        tracker
            .log_usage("u1", &UsageReport {
                event_type: AccessibilityEventType::TtsUsed,
                feature: " screen_reading ".to_string(),
                details: Some("speed 1.2".to_string()),
                success: true,
            })
            .unwrap();

        assert!(audit.contains(AuditEventType::AccessibilityUsage));
        assert_eq!(audit.events.lock()[0].1.as_deref(), Some("u1"));
    }

    #[test]
    fn test_log_usage_requires_feature() {
        let audit = Arc::new(RecordingSink::default());
        let tracker = UsageTracker::new(audit.clone());

        let result = tracker.log_usage("u1", &UsageReport {
            event_type: AccessibilityEventType::FeatureUsed,
            feature: "  ".to_string(),
            details: None,
            success: true,
        });

        assert!(matches!(result, Err(AccessibilityError::MissingFeature)));
        assert!(audit.events.lock().is_empty());
    }

    #[test]
    fn test_capability_suggestions() {
        let tracker = UsageTracker::new(Arc::new(RecordingSink::default()));

        let suggestions = tracker.record_capabilities("u1", &DeviceCapabilities {
            has_screen_reader: true,
            supports_voice_input: true,
            screen_size: Some(ScreenSize::Small),
            ..DeviceCapabilities::default()
        });

        assert_eq!(suggestions.len(), 3);
        assert!(suggestions[0].contains("screen reader"));
        assert!(DeviceCapabilities::default().suggestions().is_empty());
    }
}
