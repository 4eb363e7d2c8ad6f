//! Checks on variables an operation touched while a layer was calling it.

use crate::layers::LayerError;
use crate::variable::Variable;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableCheck {
    /// The call neither created nor read any variable.
    Skipped,
    Clean,
    /// Untracked variables were read; holds the message that was logged.
    Warned(String),
    /// Untracked variables were read after the warning already fired.
    Suppressed,
}

fn untracked<'a>(seen: &'a [Variable], tracked: &[Variable]) -> Vec<&'a Variable> {
    seen.iter().filter(|v| !tracked.contains(v)).collect()
}

fn names(variables: &[&Variable]) -> Vec<String> {
    variables.iter().map(|v| v.name().to_string()).collect()
}

/// Created variables the layer does not own are an error. Untracked reads
/// only warn, and only the first time for a given `already_warned` flag.
pub fn check_variables(
    layer: &str,
    created: &[Variable],
    accessed: &[Variable],
    tracked: &[Variable],
    already_warned: &AtomicBool,
) -> Result<VariableCheck, LayerError> {
    if created.is_empty() && accessed.is_empty() {
        return Ok(VariableCheck::Skipped);
    }

    let untracked_created = untracked(created, tracked);
    if !untracked_created.is_empty() {
        return Err(LayerError::UntrackedVariableCreation {
            layer: layer.to_string(),
            variables: names(&untracked_created),
        });
    }

    let untracked_accessed = untracked(accessed, tracked);
    if untracked_accessed.is_empty() {
        return Ok(VariableCheck::Clean);
    }
    if already_warned
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Ok(VariableCheck::Suppressed);
    }
    let message = format!(
        "Layer {} is reading variables it does not track: {:?}. They will not be saved with the layer and will not receive gradient updates through it. Wrap them in a layer that owns them instead.",
        layer,
        names(&untracked_accessed)
    );
    log::warn!("{}", message);
    Ok(VariableCheck::Warned(message))
}
