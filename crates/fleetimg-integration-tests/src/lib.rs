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

//! Fixtures shared by the FleetImg integration tests

use fleetimg_core::{
    Database, ElementImageService, EventSink, ImageEvent, ImageService, Message, MessageSink,
    StaticRoleCatalog,
};
use fleetimg_types::{ImageId, ImageInfo, ImageState, Version};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

pub const ROLES: [&str; 4] = ["SPINE", "LEAF", "BORDER", "MANAGEMENT"];

/// Keeps every event and message for later inspection
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<ImageEvent>>,
    messages: Mutex<Vec<Message>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<ImageEvent> {
        self.events.lock().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
        self.messages.lock().clear();
    }
}

impl EventSink for Recorder {
    fn fire(&self, event: ImageEvent) {
        self.events.lock().push(event);
    }
}

impl MessageSink for Recorder {
    fn add(&self, message: Message) {
        self.messages.lock().push(message);
    }
}

/// Both services wired to one database and one recorder
#[derive(Debug)]
pub struct Engine {
    pub images: ImageService,
    pub elements: ElementImageService,
    pub recorder: Arc<Recorder>,
}

impl Engine {
    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::with_database(Database::open_in_memory()?))
    }

    pub fn on_disk(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::with_database(Database::open(path)?))
    }

    fn with_database(db: Database) -> Self {
        let db = Arc::new(db);
        let recorder = Arc::new(Recorder::default());
        let images = ImageService::new(
            db.clone(),
            Arc::new(StaticRoleCatalog::new(ROLES)),
            recorder.clone(),
            recorder.clone(),
        );
        let elements = ElementImageService::new(db, recorder.clone());
        Self {
            images,
            elements,
            recorder,
        }
    }

    /// Store a `routing` image for the `trident3` chipset
    pub fn routing(
        &self,
        version: Version,
        roles: &[&str],
        state: ImageState,
    ) -> anyhow::Result<ImageId> {
        let mut info = ImageInfo::new("lxd", "routing", version, "trident3").with_state(state);
        for role in roles {
            info = info.with_role(*role);
        }
        Ok(self.images.store_image(info)?.image_id)
    }

    pub fn state(&self, image_id: &ImageId) -> anyhow::Result<ImageState> {
        Ok(self.images.get_image(image_id)?.image_state)
    }
}
