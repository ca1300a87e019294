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

//! Image lifecycle: store, rename, state transitions and removal

use crate::db::Database;
use crate::error::{ImageError, ReasonCode, Result};
use crate::events::{EventSink, ImageEvent, ImageEventPayload};
use crate::messages::{Message, MessageSink};
use crate::registry::{ImageRegistry, check_roles};
use crate::roles::RoleCatalog;
use crate::slots::supersede_slot_holders;
use chrono::Utc;
use fleetimg_types::{
    Image, ImageId, ImageInfo, ImageQuery, ImageState, ImageStatistics, ImagesExport, RoleImages,
    Version,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of `store_image`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoredImage {
    pub image_id: ImageId,
    /// True only when the submission created a new image
    pub created: bool,
}

/// Entry point for everything that changes an image record
#[derive(Debug, Clone)]
pub struct ImageService {
    db: Arc<Database>,
    roles: Arc<dyn RoleCatalog>,
    events: Arc<dyn EventSink>,
    messages: Arc<dyn MessageSink>,
}

impl ImageService {
    pub fn new(
        db: Arc<Database>,
        roles: Arc<dyn RoleCatalog>,
        events: Arc<dyn EventSink>,
        messages: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            db,
            roles,
            events,
            messages,
        }
    }

    /// Create or update an image from a submission.
    ///
    /// A new image takes the submitted state; a RELEASE submission first
    /// supersedes the current slot holders. An existing image has its
    /// attributes replaced but keeps its state.
    pub fn store_image(&self, submission: ImageInfo) -> Result<StoredImage> {
        let image_id = submission.image_id.unwrap_or_else(ImageId::random);
        let candidate = submission.into_image(image_id);

        let (stored, created, superseded) = self.db.transaction(|tx| {
            let registry = ImageRegistry::new(tx);
            match registry.find(&image_id)? {
                None => {
                    let superseded = if candidate.image_state == ImageState::Release {
                        check_roles(self.roles.as_ref(), &candidate.element_roles)?;
                        supersede_slot_holders(&registry, &candidate)?
                    } else {
                        Vec::new()
                    };
                    registry.create(&candidate, self.roles.as_ref())?;
                    Ok((candidate.clone(), true, superseded))
                }
                Some(existing) => {
                    let mut updated = candidate.clone();
                    updated.image_state = existing.image_state;
                    registry.update(&updated, self.roles.as_ref())?;
                    // a released image may have moved into slots held by others
                    let superseded = if updated.image_state == ImageState::Release {
                        supersede_slot_holders(&registry, &updated)?
                    } else {
                        Vec::new()
                    };
                    Ok((updated, false, superseded))
                }
            }
        })?;

        self.publish_superseded(&superseded);
        self.messages.add(Message::info(
            ReasonCode::ImageStored,
            format!("Image {} {} stored", stored.image_name, stored.image_version),
        ));
        let payload = ImageEventPayload::from(&stored);
        if created {
            info!(
                image_id = %image_id,
                "Added image {} {}",
                stored.image_name,
                stored.image_version
            );
            self.events.fire(ImageEvent::ImageAdded(payload));
        } else {
            info!(
                image_id = %image_id,
                "Stored image {} {}",
                stored.image_name,
                stored.image_version
            );
            self.events.fire(ImageEvent::ImageStored(payload));
        }

        Ok(StoredImage { image_id, created })
    }

    pub fn get_image(&self, image_id: &ImageId) -> Result<Image> {
        self.db
            .transaction(|tx| ImageRegistry::new(tx).get(image_id))
    }

    /// Move an image to `next`.
    ///
    /// Promotion to RELEASE supersedes the other holders of the image's
    /// slots. Every other transition touches only this image. Setting the
    /// current state again does nothing.
    pub fn update_image_state(&self, image_id: &ImageId, next: ImageState) -> Result<()> {
        let change = self.db.transaction(|tx| {
            let registry = ImageRegistry::new(tx);
            let mut image = registry.get(image_id)?;
            let previous = image.image_state;

            if previous == next {
                debug!(image_id = %image_id, "Image already in state {next}");
                return Ok(None);
            }
            if !previous.can_transition_to(next) {
                return Err(ImageError::conflict(
                    ReasonCode::IllegalStateTransition,
                    format!(
                        "image {} ({image_id}) cannot move from {previous} to {next}",
                        image.image_name
                    ),
                ));
            }

            let superseded = if next == ImageState::Release {
                supersede_slot_holders(&registry, &image)?
            } else {
                Vec::new()
            };
            registry.set_state(image_id, next)?;
            image.image_state = next;
            Ok(Some((image, previous, superseded)))
        })?;

        let Some((image, previous, superseded)) = change else {
            return Ok(());
        };

        self.publish_superseded(&superseded);
        info!(
            image_id = %image_id,
            "Image {} {} changed state {previous} -> {}",
            image.image_name,
            image.image_version,
            image.image_state
        );
        self.events.fire(ImageEvent::ImageStateChanged {
            image: ImageEventPayload::from(&image),
            previous_state: previous,
        });
        self.messages.add(Message::info(
            ReasonCode::ImageStateUpdated,
            format!(
                "Image {} {} set to {}",
                image.image_name, image.image_version, image.image_state
            ),
        ));
        Ok(())
    }

    /// Remove an image no element references. State does not matter.
    pub fn remove_image(&self, image_id: &ImageId) -> Result<Image> {
        let removed = self
            .db
            .transaction(|tx| ImageRegistry::new(tx).remove(image_id))?;

        info!(
            image_id = %image_id,
            "Removed image {} {}",
            removed.image_name,
            removed.image_version
        );
        self.messages.add(Message::info(
            ReasonCode::ImageRemoved,
            format!("Image {} {} removed", removed.image_name, removed.image_version),
        ));
        self.events
            .fire(ImageEvent::ImageRemoved(ImageEventPayload::from(&removed)));
        Ok(removed)
    }

    pub fn find_images(&self, query: &ImageQuery) -> Result<Vec<Image>> {
        self.db.transaction(|tx| ImageRegistry::new(tx).query(query))
    }

    pub fn image_types(&self) -> Result<Vec<String>> {
        self.db.transaction(|tx| ImageRegistry::new(tx).image_types())
    }

    pub fn image_versions(&self, image_type: &str) -> Result<Vec<Version>> {
        self.db
            .transaction(|tx| ImageRegistry::new(tx).image_versions(image_type))
    }

    pub fn image_statistics(&self, image_id: &ImageId) -> Result<ImageStatistics> {
        self.db.transaction(|tx| {
            let registry = ImageRegistry::new(tx);
            let image = registry.get(image_id)?;
            let (active_count, cached_count) = registry.binding_counts(image_id)?;
            Ok(ImageStatistics {
                image,
                active_count,
                cached_count,
            })
        })
    }

    /// Image lines that apply to `role`
    pub fn role_images(&self, role: &str) -> Result<RoleImages> {
        let images = self
            .db
            .transaction(|tx| ImageRegistry::new(tx).role_images(role))?;
        Ok(RoleImages {
            element_role: role.to_owned(),
            images,
        })
    }

    /// Dump every image matching `query` as a full record. The query limit is ignored.
    pub fn export_images(&self, query: &ImageQuery) -> Result<ImagesExport> {
        let unbounded = ImageQuery {
            limit: usize::MAX,
            ..query.clone()
        };
        let images = self.find_images(&unbounded)?;
        info!("Exporting {} images", images.len());
        Ok(ImagesExport {
            date_created: Utc::now(),
            images: images.into_iter().map(ImageInfo::from).collect(),
        })
    }

    /// Store every exported record in order.
    ///
    /// Each record is its own `store_image` call: the first failure stops the
    /// import and leaves earlier records stored.
    pub fn import_images(&self, export: ImagesExport) -> Result<Vec<StoredImage>> {
        let mut stored = Vec::with_capacity(export.images.len());
        for image in export.images {
            stored.push(self.store_image(image)?);
        }
        info!(
            "Imported {} images exported at {}",
            stored.len(),
            export.date_created
        );
        Ok(stored)
    }

    fn publish_superseded(&self, superseded: &[Image]) {
        for previous in superseded {
            let mut image = previous.clone();
            image.image_state = ImageState::Superseded;
            self.events.fire(ImageEvent::ImageStateChanged {
                image: ImageEventPayload::from(&image),
                previous_state: previous.image_state,
            });
        }
    }
}
