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

//! Available update resolution for installed images

use crate::bindings::{BindingStore, BoundImage};
use crate::error::Result;
use crate::registry::ImageRegistry;
use fleetimg_types::{ElementAvailableUpdate, ElementId, Image, ImageId, InstalledImage};
use rusqlite::Connection;

/// Newer revisions of `installed` within its logical key, newest first.
///
/// Every state is considered, including REVOKED. Filtering by state is left
/// to the caller.
pub fn updates_for(
    registry: &ImageRegistry<'_>,
    installed: &Image,
) -> Result<Vec<ElementAvailableUpdate>> {
    let mut candidates: Vec<(usize, Image)> = registry
        .find_by_logical_key(&installed.logical_key())?
        .into_iter()
        .filter(|candidate| candidate.image_id != installed.image_id)
        .enumerate()
        .collect();
    // insertion order breaks version ties
    candidates.sort_by(|(a_pos, a), (b_pos, b)| {
        b.image_version
            .cmp(&a.image_version)
            .then_with(|| a_pos.cmp(b_pos))
    });

    Ok(candidates
        .into_iter()
        .filter_map(|(_, candidate)| {
            let update_class = installed.image_version.classify(&candidate.image_version)?;
            Some(ElementAvailableUpdate {
                image_id: candidate.image_id,
                image_version: candidate.image_version,
                update_class,
                image_state: candidate.image_state,
                build_date: candidate.build_date,
            })
        })
        .collect())
}

/// Updates for the image bound to `element_id`.
///
/// Fails with ELEMENT_IMAGE_NOT_FOUND if the element has no binding to it.
pub fn resolve_available_updates(
    conn: &Connection,
    element_id: &ElementId,
    image_id: &ImageId,
) -> Result<Vec<ElementAvailableUpdate>> {
    let bound = BindingStore::new(conn).get(element_id, image_id)?;
    updates_for(&ImageRegistry::new(conn), &bound.image)
}

pub(crate) fn installed_image(
    registry: &ImageRegistry<'_>,
    bound: BoundImage,
) -> Result<InstalledImage> {
    let available_updates = updates_for(registry, &bound.image)?;
    Ok(InstalledImage {
        element_id: bound.binding.element_id,
        image: bound.image,
        install_state: bound.binding.install_state,
        installed_at: bound.binding.installed_at,
        available_updates,
    })
}
