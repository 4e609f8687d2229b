//! Class/threshold table and target selection

use pantrack_core::{ClassId, ClassRole, ClassRule, Detection, DetectionConfig};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedDetection {
    pub detection: Detection,
    pub role: ClassRole,
    pub label: String,
    pub priority: u32,
}

impl ClassifiedDetection {
    pub fn is_target(&self) -> bool {
        self.role == ClassRole::Target
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    rules: HashMap<ClassId, ClassRule>,
}

impl ClassTable {
    pub fn new(rules: &[ClassRule]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| (rule.class_id, rule.clone()))
            .collect();
        Self { rules }
    }

    pub fn rule(&self, class_id: ClassId) -> Option<&ClassRule> {
        self.rules.get(&class_id)
    }

    /// Keep detections of known classes at or above their class threshold,
    /// in detector order
    pub fn classify(&self, detections: Vec<Detection>) -> Vec<ClassifiedDetection> {
        detections
            .into_iter()
            .filter_map(|detection| {
                let rule = self.rules.get(&detection.class_id)?;
                if detection.confidence < rule.min_confidence {
                    return None;
                }
                Some(ClassifiedDetection {
                    role: rule.role,
                    label: rule.name.clone(),
                    priority: rule.priority,
                    detection,
                })
            })
            .collect()
    }

    /// The detection to steer towards: lowest priority value among target
    /// classes, first in detector order on ties
    pub fn select_target(classified: &[ClassifiedDetection]) -> Option<&Detection> {
        classified
            .iter()
            .filter(|c| c.is_target())
            .min_by_key(|c| c.priority)
            .map(|c| &c.detection)
    }
}

impl From<&DetectionConfig> for ClassTable {
    fn from(config: &DetectionConfig) -> Self {
        Self::new(&config.classes)
    }
}
