// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FleetImg.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Installed-image reconciliation per managed element

use crate::bindings::{BindingStore, BoundImage};
use crate::db::Database;
use crate::error::{ImageError, ReasonCode, Result};
use crate::messages::{Message, MessageSink};
use crate::registry::ImageRegistry;
use crate::updates::{installed_image, resolve_available_updates};
use fleetimg_types::{
    ElementAvailableUpdate, ElementId, ElementRef, Image, ImageId, InstallState, InstalledImage,
    InstalledImageRef, Version,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// What one `store_installed_images` call changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    /// References that matched no registered image
    pub unresolved: Vec<InstalledImageRef>,
}

type LineKey = (String, String);
type RevisionKey = (String, String, Version);

fn revision_of(bound: &BoundImage) -> RevisionKey {
    (
        bound.image.image_type.clone(),
        bound.image.image_name.clone(),
        bound.image.image_version,
    )
}

fn matches(bound: &BoundImage, image_type: &str, image_name: &str, version: Version) -> bool {
    bound.image.image_type == image_type
        && bound.image.image_name == image_name
        && bound.image.image_version == version
}

fn is_revision(image: &Image, reference: &InstalledImageRef) -> bool {
    image.image_type == reference.image_type
        && image.image_name == reference.image_name
        && image.image_version == reference.image_version
}

/// Reject submissions that claim two active revisions of one image line
fn check_single_active(element_id: &ElementId, refs: &[InstalledImageRef]) -> Result<()> {
    let mut active: BTreeMap<LineKey, &InstalledImageRef> = BTreeMap::new();
    for r in refs.iter().filter(|r| r.image_state == InstallState::Active) {
        let key = (r.image_type.clone(), r.image_name.clone());
        if let Some(first) = active.get(&key)
            && first.image_version != r.image_version
        {
            return Err(ImageError::conflict(
                ReasonCode::MultipleActiveImages,
                format!(
                    "element {element_id} reports {} {} active in versions {} and {}",
                    r.image_type, r.image_name, first.image_version, r.image_version
                ),
            ));
        }
        active.insert(key, r);
    }
    Ok(())
}

/// Find the image a reference points at.
///
/// An explicit image id wins when that image has the reference's type, name
/// and version. Otherwise images with the same type, name and version are
/// narrowed by the element's chipset and role, earliest first.
fn resolve_reference(
    registry: &ImageRegistry<'_>,
    element: &ElementRef,
    reference: &InstalledImageRef,
) -> Result<Option<Image>> {
    if let Some(image_id) = reference.image_id
        && let Some(image) = registry.find(&image_id)?
    {
        if is_revision(&image, reference) {
            return Ok(Some(image));
        }
        debug!(
            image_id = %image_id,
            "Ignoring image id of {} {} {}, it names {} {} {}",
            reference.image_type,
            reference.image_name,
            reference.image_version,
            image.image_type,
            image.image_name,
            image.image_version
        );
    }

    let found = registry
        .find_by_type_name_version(
            &reference.image_type,
            &reference.image_name,
            reference.image_version,
        )?
        .into_iter()
        .filter(|image| {
            element
                .platform_chipset
                .as_ref()
                .is_none_or(|chipset| image.platform_chipset == *chipset)
        })
        .find(|image| {
            element
                .element_role
                .as_ref()
                .is_none_or(|role| image.element_roles.contains(role))
        });
    Ok(found)
}

/// Records which images each element has installed
#[derive(Debug, Clone)]
pub struct ElementImageService {
    db: Arc<Database>,
    messages: Arc<dyn MessageSink>,
}

impl ElementImageService {
    pub fn new(db: Arc<Database>, messages: Arc<dyn MessageSink>) -> Self {
        Self { db, messages }
    }

    /// Merge the images an element reports against its recorded bindings.
    ///
    /// Only image lines named in `refs` are touched. Within them, bindings
    /// without a matching reference are removed, matching bindings take the
    /// reported install state and new references are bound when the image is
    /// known. Unknown images are skipped with a warning message.
    pub fn store_installed_images(
        &self,
        element: &ElementRef,
        refs: &[InstalledImageRef],
    ) -> Result<ReconcileSummary> {
        let element_id = &element.element_id;
        check_single_active(element_id, refs)?;

        let lines: BTreeSet<LineKey> = refs
            .iter()
            .map(|r| (r.image_type.clone(), r.image_name.clone()))
            .collect();

        let summary = self.db.transaction(|tx| {
            let registry = ImageRegistry::new(tx);
            let store = BindingStore::new(tx);
            let mut summary = ReconcileSummary::default();

            // first binding per revision is the one we keep
            let mut existing: BTreeMap<RevisionKey, BoundImage> = BTreeMap::new();
            let mut duplicates = Vec::new();
            for bound in store.for_element(element_id)? {
                let line = (bound.image.image_type.clone(), bound.image.image_name.clone());
                if !lines.contains(&line) {
                    continue;
                }
                let key = revision_of(&bound);
                if existing.contains_key(&key) {
                    duplicates.push(bound);
                } else {
                    existing.insert(key, bound);
                }
            }

            let mut wanted: BTreeMap<RevisionKey, &InstalledImageRef> = BTreeMap::new();
            for r in refs {
                wanted
                    .entry((r.image_type.clone(), r.image_name.clone(), r.image_version))
                    .or_insert(r);
            }

            for bound in duplicates {
                store.delete(bound.binding.binding_id)?;
                summary.removed += 1;
            }
            let stale: Vec<RevisionKey> = existing
                .keys()
                .filter(|key| !wanted.contains_key(*key))
                .cloned()
                .collect();
            for key in stale {
                if let Some(bound) = existing.remove(&key) {
                    debug!(
                        element_id = %element_id,
                        "Removing binding to {} {} {}",
                        key.0, key.1, key.2
                    );
                    store.delete(bound.binding.binding_id)?;
                    summary.removed += 1;
                }
            }

            for (key, reference) in wanted {
                if let Some(bound) = existing.get(&key) {
                    if bound.binding.install_state == reference.image_state {
                        summary.unchanged += 1;
                    } else {
                        store.set_state(bound.binding.binding_id, reference.image_state)?;
                        summary.updated += 1;
                    }
                    continue;
                }

                match resolve_reference(&registry, element, reference)? {
                    Some(image) => {
                        if store.find(element_id, &image.image_id)?.is_some() {
                            summary.unchanged += 1;
                            continue;
                        }
                        store.insert(element_id, &image.image_id, reference.image_state)?;
                        summary.added += 1;
                    }
                    None => summary.unresolved.push(reference.clone()),
                }
            }
            Ok(summary)
        })?;

        for reference in &summary.unresolved {
            self.messages.add(Message::warning(
                ReasonCode::ElementImageUnknown,
                format!(
                    "Element {element_id} reports unknown image {} {} {}",
                    reference.image_type, reference.image_name, reference.image_version
                ),
            ));
        }
        info!(
            element_id = %element_id,
            "Reconciled installed images: {} added, {} updated, {} removed, {} unknown",
            summary.added,
            summary.updated,
            summary.removed,
            summary.unresolved.len()
        );
        Ok(summary)
    }

    /// Remove one installed revision. Absent bindings are ignored, active ones refused.
    ///
    /// Returns whether a binding was removed.
    pub fn remove_installed_image(
        &self,
        element_id: &ElementId,
        image_type: &str,
        image_name: &str,
        version: Version,
    ) -> Result<bool> {
        let removed = self.db.transaction(|tx| {
            let store = BindingStore::new(tx);
            let matching: Vec<BoundImage> = store
                .for_element(element_id)?
                .into_iter()
                .filter(|b| matches(b, image_type, image_name, version))
                .collect();
            if matching.is_empty() {
                return Ok(false);
            }
            if matching
                .iter()
                .any(|b| b.binding.install_state == InstallState::Active)
            {
                return Err(ImageError::conflict(
                    ReasonCode::ImageActive,
                    format!(
                        "{image_type} {image_name} {version} is active on element {element_id}"
                    ),
                ));
            }
            for bound in &matching {
                store.delete(bound.binding.binding_id)?;
            }
            Ok(true)
        })?;

        if removed {
            self.messages.add(Message::info(
                ReasonCode::ElementImageRemoved,
                format!("Removed {image_type} {image_name} {version} from element {element_id}"),
            ));
        }
        Ok(removed)
    }

    /// Remove cached revisions in bulk.
    ///
    /// If any reference matches an active binding nothing is removed.
    pub fn remove_cached_images(
        &self,
        element_id: &ElementId,
        refs: &[InstalledImageRef],
    ) -> Result<usize> {
        let removed = self.db.transaction(|tx| {
            let store = BindingStore::new(tx);
            let bindings = store.for_element(element_id)?;

            let mut doomed = BTreeSet::new();
            for r in refs {
                for bound in bindings
                    .iter()
                    .filter(|b| matches(b, &r.image_type, &r.image_name, r.image_version))
                {
                    if bound.binding.install_state == InstallState::Active {
                        return Err(ImageError::conflict(
                            ReasonCode::ImageActive,
                            format!(
                                "{} {} {} is active on element {element_id}",
                                r.image_type, r.image_name, r.image_version
                            ),
                        ));
                    }
                    doomed.insert(bound.binding.binding_id);
                }
            }
            for binding_id in &doomed {
                store.delete(*binding_id)?;
            }
            Ok(doomed.len())
        })?;

        if removed > 0 {
            self.messages.add(Message::info(
                ReasonCode::ElementImageRemoved,
                format!("Removed {removed} cached images from element {element_id}"),
            ));
        }
        Ok(removed)
    }

    pub fn element_images(&self, element_id: &ElementId) -> Result<Vec<InstalledImage>> {
        self.db.transaction(|tx| {
            let registry = ImageRegistry::new(tx);
            BindingStore::new(tx)
                .for_element(element_id)?
                .into_iter()
                .map(|bound| installed_image(&registry, bound))
                .collect()
        })
    }

    pub fn installed_image(
        &self,
        element_id: &ElementId,
        image_type: &str,
        image_name: &str,
        version: Version,
    ) -> Result<InstalledImage> {
        self.db.transaction(|tx| {
            let bound = BindingStore::new(tx)
                .for_element(element_id)?
                .into_iter()
                .find(|b| matches(b, image_type, image_name, version))
                .ok_or_else(|| {
                    ImageError::not_found(
                        ReasonCode::ElementImageNotFound,
                        format!("element {element_id} has no {image_type} {image_name} {version}"),
                    )
                })?;
            installed_image(&ImageRegistry::new(tx), bound)
        })
    }

    pub fn available_updates(
        &self,
        element_id: &ElementId,
        image_id: &ImageId,
    ) -> Result<Vec<ElementAvailableUpdate>> {
        self.db
            .transaction(|tx| resolve_available_updates(tx, element_id, image_id))
    }
}
