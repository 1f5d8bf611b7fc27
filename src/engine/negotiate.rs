//! Resolving element types and checking that a chain of active elements
//! can agree on caps.

use crate::core::{Caps, CapsError, ElementId};
use crate::description::ElementSpec;
use crate::error::{PipelineError, Result};
use crate::factory::{ElementFactoryRegistry, ElementMetadata};
use crate::registry::ElementRegistry;

/// An element spec resolved against its factory
#[derive(Clone)]
pub(crate) struct ElementBinding {
    pub metadata: ElementMetadata,
    /// The `caps` filter from the description
    pub filter: Caps,
    /// What the element accepts; `None` for sources
    pub accepts: Option<Caps>,
    /// What the element produces; `None` for sinks
    pub produces: Option<Caps>,
}

impl ElementBinding {
    pub fn is_source(&self) -> bool {
        self.accepts.is_none()
    }

    pub fn is_sink(&self) -> bool {
        self.produces.is_none()
    }
}

fn build_failure(spec: &ElementSpec, reason: impl Into<String>) -> PipelineError {
    PipelineError::BuildFailure {
        id: spec.id,
        name: spec.name.clone(),
        reason: reason.into(),
    }
}

/// Looks up the element type, validates properties and narrows the
/// type's templates by the element's caps filter
pub(crate) fn bind(spec: &ElementSpec, factories: &ElementFactoryRegistry) -> Result<ElementBinding> {
    let metadata = factories
        .lookup(&spec.element_type)
        .ok_or_else(|| build_failure(spec, format!("unknown element type '{}'", spec.element_type)))?
        .clone();

    metadata
        .validate_properties(&spec.properties)
        .map_err(|reason| build_failure(spec, reason))?;

    let filter: Caps = spec
        .caps
        .parse()
        .map_err(|e| build_failure(spec, format!("invalid caps '{}': {}", spec.caps, e)))?;

    let narrow = |template: Option<Caps>, side: &str| -> Result<Option<Caps>> {
        let Some(template) = template else {
            return Ok(None);
        };
        let narrowed = template.intersect(&filter);
        if narrowed.is_empty() {
            return Err(build_failure(
                spec,
                format!(
                    "caps filter '{}' is incompatible with the {} template '{}' of {}",
                    filter, side, template, metadata.type_name
                ),
            ));
        }
        Ok(Some(narrowed))
    };

    let template_error =
        |e: CapsError| build_failure(spec, format!("invalid caps template of {}: {}", metadata.type_name, e));
    let accepts = narrow(metadata.sink_caps().map_err(template_error)?, "sink")?;
    let produces = narrow(metadata.src_caps().map_err(template_error)?, "src")?;

    Ok(ElementBinding {
        metadata,
        filter,
        accepts,
        produces,
    })
}

fn resolve(registry: &ElementRegistry, id: ElementId) -> Result<(&ElementSpec, &ElementBinding)> {
    let element = registry.get(id).ok_or(PipelineError::ElementNotFound(id))?;
    let binding = element
        .binding()
        .ok_or_else(|| build_failure(element.spec(), "element type has not been resolved"))?;
    Ok((element.spec(), binding))
}

/// Checks positions (source first, sink last) and caps compatibility of
/// every adjacent pair in `chain`
pub(crate) fn negotiate_chain(registry: &ElementRegistry, chain: &[ElementId]) -> Result<()> {
    let Some((&first, rest)) = chain.split_first() else {
        return Err(PipelineError::EmptyGraph);
    };

    let (first_spec, first_binding) = resolve(registry, first)?;
    if !first_binding.is_source() {
        return Err(build_failure(
            first_spec,
            format!("{} cannot start a pipeline: it is not a source", first_binding.metadata.type_name),
        ));
    }

    let mut upstream = (first_spec, first_binding);
    for &id in rest {
        let (spec, binding) = resolve(registry, id)?;
        let (up_spec, up_binding) = upstream;

        let (Some(produced), Some(accepted)) = (&up_binding.produces, &binding.accepts) else {
            let reason = if up_binding.is_sink() {
                format!("'{}' (#{}) is a sink and cannot feed '{}'", up_spec.name, up_spec.id, spec.name)
            } else {
                format!("'{}' (#{}) is a source and must come first", spec.name, spec.id)
            };
            return Err(build_failure(spec, reason));
        };

        if !produced.can_intersect(accepted) {
            return Err(build_failure(
                spec,
                format!(
                    "cannot negotiate caps between '{}' (#{}) and '{}' (#{}): '{}' vs '{}'",
                    up_spec.name, up_spec.id, spec.name, spec.id, produced, accepted
                ),
            ));
        }

        upstream = (spec, binding);
    }

    let (last_spec, last_binding) = upstream;
    if !last_binding.is_sink() {
        return Err(build_failure(
            last_spec,
            format!("{} cannot end a pipeline: it is not a sink", last_binding.metadata.type_name),
        ));
    }

    Ok(())
}
