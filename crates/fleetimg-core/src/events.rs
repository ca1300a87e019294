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

//! Image lifecycle events published to the event sink

use fleetimg_types::{Image, ImageId, ImageState, Version};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Snapshot of an image at the time an event is raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEventPayload {
    pub image_id: ImageId,
    pub organization: String,
    pub image_type: String,
    pub image_name: String,
    pub image_version: Version,
    pub element_roles: BTreeSet<String>,
    pub image_state: ImageState,
    pub image_extension: Option<String>,
    pub checksums: BTreeMap<String, String>,
}

impl From<&Image> for ImageEventPayload {
    fn from(image: &Image) -> Self {
        Self {
            image_id: image.image_id,
            organization: image.organization.clone(),
            image_type: image.image_type.clone(),
            image_name: image.image_name.clone(),
            image_version: image.image_version,
            element_roles: image.element_roles.clone(),
            image_state: image.image_state,
            image_extension: image.extension.clone(),
            checksums: image.checksums.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImageEvent {
    ImageAdded(ImageEventPayload),
    ImageStored(ImageEventPayload),
    ImageStateChanged {
        #[serde(flatten)]
        image: ImageEventPayload,
        previous_state: ImageState,
    },
    ImageRemoved(ImageEventPayload),
}

impl ImageEvent {
    pub fn image_id(&self) -> ImageId {
        match self {
            Self::ImageAdded(p) | Self::ImageStored(p) | Self::ImageRemoved(p) => p.image_id,
            Self::ImageStateChanged { image, .. } => image.image_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ImageAdded(_) => "ImageAdded",
            Self::ImageStored(_) => "ImageStored",
            Self::ImageStateChanged { .. } => "ImageStateChanged",
            Self::ImageRemoved(_) => "ImageRemoved",
        }
    }
}

/// Fire-and-forget publication of image events.
///
/// Delivery and ordering guarantees belong to the implementation.
pub trait EventSink: Send + Sync + fmt::Debug {
    fn fire(&self, event: ImageEvent);
}

/// Default sink: logs each event as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn fire(&self, event: ImageEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(event = event.kind(), "Image event: {json}"),
            Err(e) => tracing::warn!(event = event.kind(), "Failed to serialize image event: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetimg_types::ImageInfo;

    fn payload() -> ImageEventPayload {
        let image = ImageInfo::new("lxd", "routing", Version::new(1, 2, 3), "trident3")
            .with_role("SPINE")
            .into_image(ImageId::random());
        ImageEventPayload::from(&image)
    }

    #[test]
    fn test_image_added_serialization() {
        let event = ImageEvent::ImageAdded(payload());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("ImageAdded"));
        assert!(json.contains("1.2.3"));
        assert!(json.contains("SPINE"));
    }

    #[test]
    fn test_state_changed_carries_both_states() {
        let mut image = payload();
        image.image_state = ImageState::Release;
        let event = ImageEvent::ImageStateChanged {
            image,
            previous_state: ImageState::Candidate,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"image_state\":\"RELEASE\""));
        assert!(json.contains("\"previous_state\":\"CANDIDATE\""));
        assert_eq!(event.kind(), "ImageStateChanged");
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingEventSink.fire(ImageEvent::ImageRemoved(payload()));
    }
}
