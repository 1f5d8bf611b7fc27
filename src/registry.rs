//! In-memory table of every declared element and its live state.

use serde::Serialize;

use crate::core::ElementId;
use crate::description::{ElementSpec, PipelineDescription};
use crate::engine::negotiate::ElementBinding;
use crate::engine::stage::StageHandle;

/// A declared element together with its runtime state
pub struct LiveElementState {
    spec: ElementSpec,
    active: bool,
    pub(crate) handle: StageHandle,
    binding: Option<ElementBinding>,
}

impl LiveElementState {
    fn new(spec: ElementSpec) -> Self {
        let active = spec.enabled || !spec.optional;
        Self {
            spec,
            active,
            handle: StageHandle::Released,
            binding: None,
        }
    }

    pub fn id(&self) -> ElementId {
        self.spec.id
    }

    pub fn spec(&self) -> &ElementSpec {
        &self.spec
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_optional(&self) -> bool {
        self.spec.optional
    }

    /// Whether an instance of the element currently exists
    pub fn is_instantiated(&self) -> bool {
        !self.handle.is_released()
    }

    pub fn handle(&self) -> &StageHandle {
        &self.handle
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active || !self.spec.optional;
    }

    pub(crate) fn binding(&self) -> Option<&ElementBinding> {
        self.binding.as_ref()
    }

    pub(crate) fn bind(&mut self, binding: ElementBinding) {
        self.binding = Some(binding);
    }

    pub fn info(&self) -> ElementInfo {
        ElementInfo {
            id: self.spec.id,
            name: self.spec.name.clone(),
            element_type: self.spec.element_type.clone(),
            optional: self.spec.optional,
            active: self.active,
        }
    }
}

/// Display snapshot of one element
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementInfo {
    pub id: ElementId,
    pub name: String,
    #[serde(rename = "type")]
    pub element_type: String,
    pub optional: bool,
    pub active: bool,
}

/// Every declared element, indexed by id
#[derive(Default)]
pub struct ElementRegistry {
    elements: Vec<LiveElementState>,
}

impl ElementRegistry {
    pub fn new(description: &PipelineDescription) -> Self {
        Self {
            elements: description
                .elements()
                .iter()
                .cloned()
                .map(LiveElementState::new)
                .collect(),
        }
    }

    pub fn get(&self, id: ElementId) -> Option<&LiveElementState> {
        self.elements.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: ElementId) -> Option<&mut LiveElementState> {
        self.elements.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveElementState> {
        self.elements.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut LiveElementState> {
        self.elements.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn optional_ids(&self) -> Vec<ElementId> {
        self.elements
            .iter()
            .filter(|e| e.is_optional())
            .map(LiveElementState::id)
            .collect()
    }

    /// Active elements in flow order
    pub fn active_chain(&self) -> Vec<ElementId> {
        self.elements
            .iter()
            .filter(|e| e.is_active())
            .map(LiveElementState::id)
            .collect()
    }

    /// The chain as it would be with `id` set to `active`
    pub fn chain_with(&self, id: ElementId, active: bool) -> Vec<ElementId> {
        self.elements
            .iter()
            .filter(|e| if e.id() == id { active } else { e.is_active() })
            .map(LiveElementState::id)
            .collect()
    }

    /// Nearest active element declared before `id`
    pub fn upstream_of(&self, id: ElementId) -> Option<ElementId> {
        self.elements[..id.index().min(self.elements.len())]
            .iter()
            .rev()
            .find(|e| e.is_active())
            .map(LiveElementState::id)
    }

    /// Nearest active element declared after `id`
    pub fn downstream_of(&self, id: ElementId) -> Option<ElementId> {
        self.elements
            .iter()
            .skip(id.index() + 1)
            .find(|e| e.is_active())
            .map(LiveElementState::id)
    }

    /// `src -> filter -> sink`
    pub fn describe_chain(&self, chain: &[ElementId]) -> String {
        chain
            .iter()
            .filter_map(|id| self.get(*id))
            .map(|e| e.spec().name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn infos(&self) -> Vec<ElementInfo> {
        self.elements.iter().map(LiveElementState::info).collect()
    }

    /// First element whose name repeats an earlier one
    pub fn duplicate_name(&self) -> Option<&LiveElementState> {
        self.elements.iter().enumerate().find_map(|(i, e)| {
            self.elements[..i]
                .iter()
                .any(|earlier| earlier.spec.name == e.spec.name)
                .then_some(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ElementRegistry {
        let description = PipelineDescription::from_json(json!({
            "pipeline": {"elements": [
                {"name": "src", "type": "testsrc", "caps": "ANY", "optional": false},
                {"name": "a", "type": "volume", "caps": "ANY", "optional": true, "enabled": false},
                {"name": "b", "type": "identity", "caps": "ANY", "optional": true},
                {"name": "sink", "type": "fakesink", "caps": "ANY", "optional": false}
            ]}
        }))
        .unwrap();
        ElementRegistry::new(&description)
    }

    #[test]
    fn test_initial_active_state() {
        let registry = registry();
        assert_eq!(registry.active_chain(), vec![ElementId(0), ElementId(2), ElementId(3)]);
        assert_eq!(registry.optional_ids(), vec![ElementId(1), ElementId(2)]);
        assert!(registry.iter().all(|e| !e.is_instantiated()));
    }

    #[test]
    fn test_neighbours_skip_inactive_elements() {
        let registry = registry();
        assert_eq!(registry.upstream_of(ElementId(2)), Some(ElementId(0)));
        assert_eq!(registry.downstream_of(ElementId(0)), Some(ElementId(2)));
        assert_eq!(registry.downstream_of(ElementId(1)), Some(ElementId(2)));
        assert_eq!(registry.upstream_of(ElementId(0)), None);
        assert_eq!(registry.downstream_of(ElementId(3)), None);
    }

    #[test]
    fn test_chain_with_does_not_mutate() {
        let registry = registry();
        let chain = registry.chain_with(ElementId(1), true);
        assert_eq!(registry.describe_chain(&chain), "src -> a -> b -> sink");
        assert_eq!(registry.describe_chain(&registry.active_chain()), "src -> b -> sink");
    }

    #[test]
    fn test_non_optional_cannot_be_deactivated() {
        let mut registry = registry();
        registry.get_mut(ElementId(0)).unwrap().set_active(false);
        assert!(registry.get(ElementId(0)).unwrap().is_active());
    }

    #[test]
    fn test_duplicate_name_detection() {
        let description = PipelineDescription::from_json(json!({
            "pipeline": {"elements": [
                {"name": "x", "type": "testsrc", "caps": "ANY", "optional": false},
                {"name": "x", "type": "fakesink", "caps": "ANY", "optional": false}
            ]}
        }))
        .unwrap();
        let registry = ElementRegistry::new(&description);
        assert_eq!(registry.duplicate_name().map(|e| e.id()), Some(ElementId(1)));
    }
}
