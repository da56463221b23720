//! Bootstrapping of custom resource-types built from other custom types.

use std::sync::Arc;

use crate::error::{Result, ScanError};
use crate::pipeline::ResourceType;
use crate::scanner::ResourceTypeScanner;

/// Names of the resource-types currently being resolved, outermost first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ResolutionChain(Vec<String>);

impl ResolutionChain {
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|entry| entry == name)
    }

    pub(crate) fn depth(&self) -> usize {
        self.0.len()
    }

    /// The chain extended with `name`.
    pub(crate) fn enter(&self, name: &str) -> Self {
        let mut names = self.0.clone();
        names.push(name.to_string());
        Self(names)
    }

    fn cycle_through(&self, name: &str) -> ScanError {
        let mut chain = self.0.clone();
        chain.push(name.to_string());
        ScanError::ResourceTypeCycle { chain }
    }
}

/// The pipeline type `target` is built from when it is a custom type that
/// has no version yet. Built-in base types and self references are ignored.
pub(crate) fn unversioned_parent<'a>(
    target: &dyn ResourceType,
    resource_types: &'a [Arc<dyn ResourceType>],
) -> Option<&'a Arc<dyn ResourceType>> {
    resource_types.iter().find(|parent| {
        parent.name() != target.name()
            && parent.name() == target.type_name()
            && parent.version().is_none()
    })
}

/// Make sure the custom type `target` is built from has a version, scanning
/// it first when it does not.
///
/// `chain` already contains `target`; running into a name that is on it
/// again reports a cycle instead of recursing.
pub(crate) async fn resolve_ancestors(
    scanner: &ResourceTypeScanner,
    target: &dyn ResourceType,
    resource_types: &[Arc<dyn ResourceType>],
    chain: &ResolutionChain,
) -> Result<()> {
    let Some(parent) = unversioned_parent(target, resource_types) else {
        return Ok(());
    };

    if chain.contains(parent.name()) {
        return Err(chain.cycle_through(parent.name()));
    }

    tracing::info!(
        target: "radar::scan",
        resource_type = target.name(),
        parent = parent.name(),
        "parent resource type has no version, scanning it first"
    );

    scanner.scan_ancestor(parent.name(), chain).await?;
    Ok(())
}
